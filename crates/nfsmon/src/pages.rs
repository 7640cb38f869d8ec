//! Dashboard pages and the poll loops they own.
//!
//! A page starts its loops when opened and stops all of them when dropped.
//! The clients page also re-scopes its detail loops whenever the selected
//! client or selected state moves.

use crate::monitors::{
    ClientListCommand, ClientListMonitor, ClientSummaryCommand, ClientSummaryMonitor,
    FilesystemMonitor, OperationsMonitor, StateKind, StateSummaryMonitor,
};
use crate::scheduler::{PollConfig, PollHandle, ScopedPoll};
use crate::source::{Endpoint, SnapshotSource};
use nfsmon_core::{ClientId, ProtocolFamily, StateId};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsChange {
    Filesystem,
    Operations(ProtocolFamily),
}

/// Filesystem capacity and health plus both operation counter feeds.
pub struct StatsPage {
    pub filesystem: PollHandle<FilesystemMonitor>,
    pub nfs4: PollHandle<OperationsMonitor>,
    pub nfs3: PollHandle<OperationsMonitor>,
}

impl StatsPage {
    pub fn open<S: SnapshotSource>(source: &S, config: PollConfig) -> Self {
        info!(event = "page_open", page = "stats");
        Self {
            filesystem: PollHandle::spawn(
                source.clone(),
                FilesystemMonitor::new(config.hidden_sections),
                config,
            ),
            nfs4: PollHandle::spawn(
                source.clone(),
                OperationsMonitor::new(ProtocolFamily::Nfs4),
                config,
            ),
            nfs3: PollHandle::spawn(
                source.clone(),
                OperationsMonitor::new(ProtocolFamily::Nfs3),
                config,
            ),
        }
    }

    pub fn operations(&self, family: ProtocolFamily) -> &PollHandle<OperationsMonitor> {
        match family {
            ProtocolFamily::Nfs4 => &self.nfs4,
            ProtocolFamily::Nfs3 => &self.nfs3,
        }
    }

    /// Waits for any feed on the page to publish. `None` once a loop is gone.
    pub async fn changed(&mut self) -> Option<StatsChange> {
        tokio::select! {
            alive = self.filesystem.changed() => alive.then_some(StatsChange::Filesystem),
            alive = self.nfs4.changed() => alive.then_some(StatsChange::Operations(ProtocolFamily::Nfs4)),
            alive = self.nfs3.changed() => alive.then_some(StatsChange::Operations(ProtocolFamily::Nfs3)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientsChange {
    Clients,
    Summary,
    State(StateKind),
}

type StateScope = ScopedPoll<(ClientId, StateId), StateSummaryMonitor>;

/// Client list, the selected client's summary and one detail loop per
/// selected state kind.
pub struct ClientsPage<S: SnapshotSource> {
    source: S,
    config: PollConfig,
    clients: PollHandle<ClientListMonitor>,
    summary: ScopedPoll<ClientId, ClientSummaryMonitor>,
    states: [StateScope; 3],
}

impl<S: SnapshotSource> ClientsPage<S> {
    pub fn open(source: &S, config: PollConfig) -> Self {
        info!(event = "page_open", page = "clients");
        Self {
            source: source.clone(),
            config,
            clients: PollHandle::spawn(source.clone(), ClientListMonitor, config),
            summary: ScopedPoll::default(),
            states: Default::default(),
        }
    }

    pub fn clients(&self) -> &PollHandle<ClientListMonitor> {
        &self.clients
    }

    pub fn summary(&self) -> Option<&PollHandle<ClientSummaryMonitor>> {
        self.summary.handle()
    }

    pub fn state(&self, kind: StateKind) -> Option<&PollHandle<StateSummaryMonitor>> {
        self.states[kind.index()].handle()
    }

    pub fn selected_client(&self) -> Option<ClientId> {
        self.clients.borrow().view.selected().cloned()
    }

    /// Asks the client list loop to move the selection. Ids that are not
    /// listed are ignored by the loop.
    pub fn select_client(&self, client_id: ClientId) -> bool {
        self.clients.send(ClientListCommand::Select(client_id))
    }

    pub fn select_state(&self, kind: StateKind, state_id: StateId) -> bool {
        match self.summary.handle() {
            Some(summary) => summary.send(ClientSummaryCommand::SelectState(kind, state_id)),
            None => false,
        }
    }

    /// Fire-and-forget revoke of every state held by `client_id`. Failures
    /// are only logged.
    pub fn revoke(&self, client_id: ClientId) -> JoinHandle<()> {
        let source = self.source.clone();
        tokio::spawn(async move {
            let endpoint = Endpoint::Revoke(client_id.clone());
            match source.post(&endpoint, Value::Bool(true)).await {
                Ok(()) => info!(event = "client_revoke_sent", client_id = %client_id),
                Err(err) => warn!(
                    event = "client_revoke_failed",
                    client_id = %client_id,
                    kind = err.kind(),
                    error = %err
                ),
            }
        })
    }

    /// Waits for any loop on the page to publish, then re-scopes the detail
    /// loops. `None` once the client list loop is gone.
    pub async fn changed(&mut self) -> Option<ClientsChange> {
        let change = {
            let [opens, delegations, layouts] = &mut self.states;
            tokio::select! {
                alive = self.clients.changed() => {
                    if !alive {
                        return None;
                    }
                    ClientsChange::Clients
                }
                true = self.summary.changed() => ClientsChange::Summary,
                true = opens.changed() => ClientsChange::State(StateKind::Open),
                true = delegations.changed() => ClientsChange::State(StateKind::Delegation),
                true = layouts.changed() => ClientsChange::State(StateKind::Layout),
            }
        };
        if matches!(change, ClientsChange::Clients | ClientsChange::Summary) {
            self.sync_scopes();
        }
        Some(change)
    }

    /// Points the summary loop at the selected client and each state loop at
    /// the selected state of its kind. Scopes that lost their target are torn
    /// down, which clears their view.
    pub fn sync_scopes(&mut self) {
        let selected = self.selected_client();
        if self.summary.retarget(selected.clone(), &self.source, self.config, |client_id| {
            ClientSummaryMonitor::new(client_id.clone())
        }) {
            debug!(
                event = "summary_retarget",
                client_id = selected.as_deref().unwrap_or("-")
            );
        }

        for kind in StateKind::ALL {
            let target = self.summary.handle().and_then(|summary| {
                let feed = summary.borrow();
                feed.view
                    .states(kind)
                    .selected()
                    .map(|state_id| (feed.view.client_id.clone(), state_id.clone()))
            });
            let moved = self.states[kind.index()].retarget(
                target.clone(),
                &self.source,
                self.config,
                |(client_id, state_id)| StateSummaryMonitor::new(client_id.clone(), state_id.clone()),
            );
            if moved {
                debug!(
                    event = "state_retarget",
                    kind = %kind,
                    state_id = target.as_ref().map(|(_, state)| state.as_str()).unwrap_or("-")
                );
            }
        }
    }
}
