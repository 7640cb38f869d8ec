//! Fixed-cadence poll loops bound to a view lifetime.
//!
//! Every loop owns the reconciled state of exactly one feed. The state lives
//! inside a `watch` channel: the loop mutates it in place and only notifies
//! subscribers when reconciliation reports a visible change. Dropping the
//! [`PollHandle`] stops the loop and drops every in-flight request with it,
//! so a cancelled loop can never publish again.

use crate::source::{decode_payload, Endpoint, FetchError, SnapshotSource};
use chrono::{DateTime, Utc};
use futures_util::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use nfsmon_core::HiddenSections;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fmt, str::FromStr, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_STALE_AFTER: u32 = 3;
const COMMAND_QUEUE_CAPACITY: usize = 16;

/// How responses that complete out of issue order are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sequencing {
    /// Drop any response older than the newest accepted one.
    #[default]
    Ordered,
    /// Accept every response as it completes; the last one to land wins.
    Unordered,
}

impl Sequencing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sequencing::Ordered => "ordered",
            Sequencing::Unordered => "unordered",
        }
    }
}

impl fmt::Display for Sequencing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sequencing {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ordered" | "sequenced" => Ok(Sequencing::Ordered),
            "unordered" | "compat" => Ok(Sequencing::Unordered),
            other => Err(format!("Unknown sequencing mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub sequencing: Sequencing,
    /// Consecutive failures before a feed is flagged stale; 0 disables it.
    pub stale_after: u32,
    pub hidden_sections: HiddenSections,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            sequencing: Sequencing::default(),
            stale_after: DEFAULT_STALE_AFTER,
            hidden_sections: HiddenSections::default(),
        }
    }
}

/// Hands out monotonic tick numbers and decides which responses to keep.
#[derive(Debug, Clone)]
pub struct TickSequencer {
    mode: Sequencing,
    issued: u64,
    accepted: Option<u64>,
}

impl TickSequencer {
    pub fn new(mode: Sequencing) -> Self {
        Self {
            mode,
            issued: 0,
            accepted: None,
        }
    }

    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn accepted(&self) -> Option<u64> {
        self.accepted
    }

    /// True when a newer response than `tick` has already been accepted.
    pub fn is_superseded(&self, tick: u64) -> bool {
        match self.mode {
            Sequencing::Unordered => false,
            Sequencing::Ordered => self.accepted.is_some_and(|accepted| tick <= accepted),
        }
    }

    pub fn accept(&mut self, tick: u64) -> bool {
        if self.is_superseded(tick) {
            return false;
        }
        self.accepted = Some(tick);
        true
    }
}

/// Freshness bookkeeping published next to every feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedHealth {
    pub consecutive_failures: u32,
    pub stale: bool,
    pub accepted_tick: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl FeedHealth {
    /// Returns true when the visible staleness flag flipped.
    pub fn record_success(&mut self, tick: u64, at: DateTime<Utc>) -> bool {
        let was_stale = self.stale;
        self.accepted_tick = Some(tick);
        self.last_success_at = Some(at);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.stale = false;
        was_stale
    }

    /// Returns true when the visible staleness flag flipped.
    pub fn record_failure(&mut self, error: &FetchError, stale_after: u32) -> bool {
        let was_stale = self.stale;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.stale = stale_after > 0 && self.consecutive_failures >= stale_after;
        self.stale != was_stale
    }
}

/// Reconciled view plus its freshness, as seen by presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed<V> {
    pub view: V,
    pub health: FeedHealth,
}

/// Result of folding one primary payload into a view.
#[derive(Debug, Default)]
pub struct Applied {
    pub changed: bool,
    /// `Some` starts a new batch of follow-up fetches and supersedes every
    /// batch issued before it, even when the new batch is empty.
    pub follow_ups: Option<Vec<Endpoint>>,
}

impl Applied {
    pub fn changed(changed: bool) -> Self {
        Self {
            changed,
            follow_ups: None,
        }
    }

    pub fn with_follow_ups(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.follow_ups = Some(endpoints);
        self
    }
}

/// Reconciliation rules for one monitored entity.
pub trait Monitor: Send + 'static {
    type Payload: DeserializeOwned + Send + 'static;
    type View: Send + Sync + 'static;
    type Command: Send + 'static;

    fn name(&self) -> &'static str;

    fn endpoint(&self) -> Endpoint;

    fn initial_view(&self) -> Self::View;

    fn apply(&mut self, view: &mut Self::View, payload: Self::Payload) -> Applied;

    /// Operator input routed into the loop; returns whether the view changed.
    fn command(&mut self, view: &mut Self::View, command: Self::Command) -> bool;

    /// Folds the response of a follow-up fetch from the current batch.
    fn apply_follow_up(
        &mut self,
        _view: &mut Self::View,
        _endpoint: &Endpoint,
        _payload: Value,
    ) -> Result<bool, FetchError> {
        Ok(false)
    }
}

enum Completion {
    Primary {
        tick: u64,
        endpoint: Endpoint,
        result: Result<Value, FetchError>,
    },
    FollowUp {
        batch: u64,
        endpoint: Endpoint,
        result: Result<Value, FetchError>,
    },
}

/// Owner side of a running poll loop.
pub struct PollHandle<M: Monitor> {
    state: watch::Receiver<Feed<M::View>>,
    commands: mpsc::Sender<M::Command>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl<M: Monitor> PollHandle<M> {
    /// Starts polling immediately; the first request is issued without
    /// waiting for a full interval.
    pub fn spawn<S: SnapshotSource>(source: S, monitor: M, config: PollConfig) -> Self {
        let feed = Feed {
            view: monitor.initial_view(),
            health: FeedHealth::default(),
        };
        let (state_tx, state_rx) = watch::channel(feed);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_poll_loop(
            source,
            monitor,
            config,
            state_tx,
            command_rx,
            shutdown_rx,
        ));
        Self {
            state: state_rx,
            commands: command_tx,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Feed<M::View>> {
        self.state.clone()
    }

    pub fn borrow(&self) -> watch::Ref<'_, Feed<M::View>> {
        self.state.borrow()
    }

    /// Waits for the next published change. Returns false once the loop is
    /// gone.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Queues operator input without waiting; false if the loop is gone or
    /// its queue is full.
    pub fn send(&self, command: M::Command) -> bool {
        self.commands.try_send(command).is_ok()
    }

    /// Stops the loop and waits for it to finish.
    pub async fn cancel(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<M: Monitor> Drop for PollHandle<M> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A poll loop that follows a changing reference, such as the selected
/// client. Each retarget tears the previous loop down before the next one
/// starts, and the new loop begins from a fresh view.
pub struct ScopedPoll<K, M: Monitor> {
    target: Option<K>,
    handle: Option<PollHandle<M>>,
}

impl<K, M: Monitor> Default for ScopedPoll<K, M> {
    fn default() -> Self {
        Self {
            target: None,
            handle: None,
        }
    }
}

impl<K: Clone + PartialEq, M: Monitor> ScopedPoll<K, M> {
    pub fn handle(&self) -> Option<&PollHandle<M>> {
        self.handle.as_ref()
    }

    /// Returns true when the scope moved.
    pub fn retarget<S: SnapshotSource>(
        &mut self,
        target: Option<K>,
        source: &S,
        config: PollConfig,
        make: impl FnOnce(&K) -> M,
    ) -> bool {
        if self.target == target {
            return false;
        }
        self.handle = None;
        self.handle = target
            .as_ref()
            .map(|key| PollHandle::spawn(source.clone(), make(key), config));
        self.target = target;
        true
    }

    /// Waits for the scoped loop to publish; never resolves while unscoped.
    pub async fn changed(&mut self) -> bool {
        match self.handle.as_mut() {
            Some(handle) => handle.changed().await,
            None => std::future::pending().await,
        }
    }
}

fn fetch_primary<S: SnapshotSource>(
    source: S,
    endpoint: Endpoint,
    tick: u64,
) -> BoxFuture<'static, Completion> {
    async move {
        let result = source.fetch(&endpoint).await;
        Completion::Primary {
            tick,
            endpoint,
            result,
        }
    }
    .boxed()
}

fn fetch_follow_up<S: SnapshotSource>(
    source: S,
    endpoint: Endpoint,
    batch: u64,
) -> BoxFuture<'static, Completion> {
    async move {
        let result = source.fetch(&endpoint).await;
        Completion::FollowUp {
            batch,
            endpoint,
            result,
        }
    }
    .boxed()
}

async fn run_poll_loop<S: SnapshotSource, M: Monitor>(
    source: S,
    mut monitor: M,
    config: PollConfig,
    state: watch::Sender<Feed<M::View>>,
    mut commands: mpsc::Receiver<M::Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    let feed = monitor.name();
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: FuturesUnordered<BoxFuture<'static, Completion>> = FuturesUnordered::new();
    let mut sequencer = TickSequencer::new(config.sequencing);
    let mut batch = 0u64;
    let mut commands_open = true;

    info!(
        event = "poll_loop_start",
        feed,
        endpoint = %monitor.endpoint(),
        interval_ms = config.interval.as_millis() as u64,
        sequencing = %config.sequencing
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let tick = sequencer.issue();
                in_flight.push(fetch_primary(source.clone(), monitor.endpoint(), tick));
            }
            Some(completion) = in_flight.next(), if !in_flight.is_empty() => {
                match completion {
                    Completion::Primary { tick, endpoint, result } => {
                        let decoded = result
                            .and_then(|value| decode_payload::<M::Payload>(&endpoint, value));
                        if sequencer.is_superseded(tick) {
                            debug!(
                                event = "poll_response_superseded",
                                feed,
                                tick,
                                accepted = sequencer.accepted().unwrap_or_default()
                            );
                            continue;
                        }
                        match decoded {
                            Ok(payload) => {
                                sequencer.accept(tick);
                                let mut follow_ups = None;
                                let mut recovered = false;
                                state.send_if_modified(|current| {
                                    let applied = monitor.apply(&mut current.view, payload);
                                    follow_ups = applied.follow_ups;
                                    recovered = current.health.record_success(tick, Utc::now());
                                    applied.changed || recovered
                                });
                                if recovered {
                                    info!(event = "poll_feed_recovered", feed, tick);
                                }
                                if let Some(endpoints) = follow_ups {
                                    batch += 1;
                                    for endpoint in endpoints {
                                        in_flight.push(fetch_follow_up(source.clone(), endpoint, batch));
                                    }
                                }
                            }
                            Err(err) => {
                                let mut failures = 0;
                                let mut stale = false;
                                let flipped = state.send_if_modified(|current| {
                                    let flipped = current.health.record_failure(&err, config.stale_after);
                                    failures = current.health.consecutive_failures;
                                    stale = current.health.stale;
                                    flipped
                                });
                                if flipped && stale {
                                    warn!(event = "poll_feed_stale", feed, failures, error = %err);
                                } else if failures == 1 {
                                    warn!(event = "poll_fetch_failed", feed, kind = err.kind(), error = %err);
                                } else {
                                    debug!(event = "poll_fetch_failed", feed, failures, error = %err);
                                }
                            }
                        }
                    }
                    Completion::FollowUp { batch: issued, endpoint, result } => {
                        if issued != batch {
                            debug!(event = "poll_follow_up_discarded", feed, endpoint = %endpoint);
                            continue;
                        }
                        let mut outcome = Ok(false);
                        match result {
                            Ok(value) => {
                                state.send_if_modified(|current| {
                                    outcome = monitor.apply_follow_up(&mut current.view, &endpoint, value);
                                    matches!(outcome, Ok(true))
                                });
                            }
                            Err(err) => outcome = Err(err),
                        }
                        if let Err(err) = outcome {
                            warn!(event = "poll_follow_up_failed", feed, kind = err.kind(), error = %err);
                        }
                    }
                }
            }
            maybe_command = commands.recv(), if commands_open => {
                match maybe_command {
                    Some(command) => {
                        state.send_if_modified(|current| monitor.command(&mut current.view, command));
                    }
                    None => {
                        commands_open = false;
                    }
                }
            }
        }
    }

    info!(event = "poll_loop_stop", feed, issued = sequencer.issued());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use serde_json::json;
    use std::convert::Infallible;

    /// Minimal monitor: mirrors a list of strings verbatim.
    struct EchoMonitor;

    impl Monitor for EchoMonitor {
        type Payload = Vec<String>;
        type View = Vec<String>;
        type Command = Infallible;

        fn name(&self) -> &'static str {
            "echo"
        }

        fn endpoint(&self) -> Endpoint {
            Endpoint::Clients
        }

        fn initial_view(&self) -> Vec<String> {
            Vec::new()
        }

        fn apply(&mut self, view: &mut Vec<String>, payload: Vec<String>) -> Applied {
            if *view == payload {
                return Applied::changed(false);
            }
            *view = payload;
            Applied::changed(true)
        }

        fn command(&mut self, _view: &mut Vec<String>, command: Infallible) -> bool {
            match command {}
        }
    }

    fn config(sequencing: Sequencing) -> PollConfig {
        PollConfig {
            sequencing,
            ..PollConfig::default()
        }
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn sequencer_rejects_older_ticks_when_ordered() {
        let mut sequencer = TickSequencer::new(Sequencing::Ordered);
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(sequencer.accept(second));
        assert!(sequencer.is_superseded(first));
        assert!(!sequencer.accept(first));
        assert_eq!(sequencer.accepted(), Some(second));
    }

    #[test]
    fn sequencer_accepts_everything_when_unordered() {
        let mut sequencer = TickSequencer::new(Sequencing::Unordered);
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(sequencer.accept(second));
        assert!(sequencer.accept(first));
        assert_eq!(sequencer.accepted(), Some(first));
    }

    #[test]
    fn health_flags_stale_after_threshold_and_recovers() {
        let err = FetchError::transport(&Endpoint::Clients, "refused");
        let mut health = FeedHealth::default();
        assert!(!health.record_failure(&err, 2));
        assert!(health.record_failure(&err, 2));
        assert!(health.stale);
        assert!(!health.record_failure(&err, 2));
        assert!(health.record_success(4, Utc::now()));
        assert!(!health.stale);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.accepted_tick, Some(4));
    }

    #[test]
    fn health_never_stales_when_threshold_disabled() {
        let err = FetchError::transport(&Endpoint::Clients, "refused");
        let mut health = FeedHealth::default();
        for _ in 0..10 {
            assert!(!health.record_failure(&err, 0));
        }
        assert!(!health.stale);
    }

    #[test]
    fn sequencing_parses_modes() {
        assert_eq!("ordered".parse::<Sequencing>(), Ok(Sequencing::Ordered));
        assert_eq!("Compat".parse::<Sequencing>(), Ok(Sequencing::Unordered));
        assert!("fifo".parse::<Sequencing>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_fires_immediately_then_every_interval() {
        let source = ScriptedSource::new();
        source.push_ok(Endpoint::Clients, json!(["a"]));
        let mut handle = PollHandle::spawn(source.clone(), EchoMonitor, PollConfig::default());

        assert!(handle.changed().await);
        assert_eq!(handle.borrow().view, vec!["a"]);
        assert_eq!(source.request_count(&Endpoint::Clients), 1);

        settle(2500).await;
        assert_eq!(source.request_count(&Endpoint::Clients), 3);
        assert!(!handle.subscribe().has_changed().expect("loop alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn ordered_mode_discards_late_response_from_older_tick() {
        let source = ScriptedSource::new();
        source.push_ok_after(Endpoint::Clients, json!(["old"]), Duration::from_millis(1500));
        source.push_ok(Endpoint::Clients, json!(["new"]));
        let handle = PollHandle::spawn(source.clone(), EchoMonitor, config(Sequencing::Ordered));

        settle(1600).await;
        assert_eq!(handle.borrow().view, vec!["new"]);
        assert_eq!(handle.borrow().health.accepted_tick, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unordered_mode_lets_late_response_win() {
        let source = ScriptedSource::new();
        source.push_ok_after(Endpoint::Clients, json!(["old"]), Duration::from_millis(1500));
        source.push_ok(Endpoint::Clients, json!(["new"]));
        let handle = PollHandle::spawn(source.clone(), EchoMonitor, config(Sequencing::Unordered));

        settle(1600).await;
        assert_eq!(handle.borrow().view, vec!["old"]);
        assert_eq!(handle.borrow().health.accepted_tick, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_keep_state_and_raise_staleness() {
        let source = ScriptedSource::new();
        source.push_ok(Endpoint::Clients, json!(["a"]));
        source.push_err(Endpoint::Clients, FetchError::transport(&Endpoint::Clients, "refused"));
        source.push_ok(Endpoint::Clients, json!({"not": "a list"}));
        source.push_err(Endpoint::Clients, FetchError::transport(&Endpoint::Clients, "refused"));
        source.push_ok(Endpoint::Clients, json!(["a", "b"]));
        let handle = PollHandle::spawn(source.clone(), EchoMonitor, PollConfig::default());

        settle(3500).await;
        {
            let feed = handle.borrow();
            assert_eq!(feed.view, vec!["a"]);
            assert!(feed.health.stale);
            assert_eq!(feed.health.consecutive_failures, 3);
            assert!(feed.health.last_error.is_some());
        }

        settle(1000).await;
        let feed = handle.borrow();
        assert_eq!(feed.view, vec!["a", "b"]);
        assert!(!feed.health.stale);
        assert!(feed.health.last_success_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_stops_polling_and_closes_feed() {
        let source = ScriptedSource::new();
        source.push_ok(Endpoint::Clients, json!(["a"]));
        source.push_ok_after(Endpoint::Clients, json!(["late"]), Duration::from_millis(500));
        let mut handle = PollHandle::spawn(source.clone(), EchoMonitor, PollConfig::default());
        assert!(handle.changed().await);
        let mut observer = handle.subscribe();

        settle(1200).await;
        drop(handle);
        let issued = source.request_count(&Endpoint::Clients);

        settle(5000).await;
        assert_eq!(source.request_count(&Endpoint::Clients), issued);
        assert!(observer.changed().await.is_err());
        assert_eq!(observer.borrow().view, vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_waits_for_loop_exit() {
        let source = ScriptedSource::new();
        source.push_ok(Endpoint::Clients, json!(["a"]));
        let mut handle = PollHandle::spawn(source.clone(), EchoMonitor, PollConfig::default());
        assert!(handle.changed().await);
        let mut observer = handle.subscribe();

        handle.cancel().await;
        assert!(observer.changed().await.is_err());
    }
}
