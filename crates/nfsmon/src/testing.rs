//! In-memory [`SnapshotSource`] driven by per-endpoint scripts.
//!
//! Each endpoint holds a queue of responses. A fetch consumes the head of
//! the queue until a single entry is left; that last entry is then repeated
//! for every later fetch. Pair with a paused tokio clock so delays are
//! deterministic.
//!
//! Only built for this crate's tests or with the `testing` feature.

use crate::source::{Endpoint, FetchError, SnapshotSource};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Scripted {
    delay: Duration,
    result: Result<Value, FetchError>,
}

#[derive(Debug, Default)]
struct Script {
    responses: HashMap<Endpoint, VecDeque<Scripted>>,
    requests: Vec<Endpoint>,
    posts: Vec<(Endpoint, Value)>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, endpoint: Endpoint, delay: Duration, result: Result<Value, FetchError>) {
        self.lock()
            .responses
            .entry(endpoint)
            .or_default()
            .push_back(Scripted { delay, result });
    }

    pub fn push_ok(&self, endpoint: Endpoint, value: Value) {
        self.push(endpoint, Duration::ZERO, Ok(value));
    }

    pub fn push_ok_after(&self, endpoint: Endpoint, value: Value, delay: Duration) {
        self.push(endpoint, delay, Ok(value));
    }

    pub fn push_err(&self, endpoint: Endpoint, error: FetchError) {
        self.push(endpoint, Duration::ZERO, Err(error));
    }

    pub fn request_count(&self, endpoint: &Endpoint) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| *request == endpoint)
            .count()
    }

    pub fn requests(&self) -> Vec<Endpoint> {
        self.lock().requests.clone()
    }

    pub fn posts(&self) -> Vec<(Endpoint, Value)> {
        self.lock().posts.clone()
    }

    fn next_response(&self, endpoint: &Endpoint) -> Scripted {
        let mut script = self.lock();
        script.requests.push(endpoint.clone());
        let Some(queue) = script.responses.get_mut(endpoint) else {
            return Scripted {
                delay: Duration::ZERO,
                result: Err(FetchError::transport(endpoint, "no scripted response")),
            };
        };
        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        queue.front().cloned().unwrap_or_else(|| Scripted {
            delay: Duration::ZERO,
            result: Err(FetchError::transport(endpoint, "no scripted response")),
        })
    }
}

impl SnapshotSource for ScriptedSource {
    fn fetch(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Value, FetchError>> + Send {
        let scripted = self.next_response(endpoint);
        async move {
            if !scripted.delay.is_zero() {
                tokio::time::sleep(scripted.delay).await;
            }
            scripted.result
        }
    }

    fn post(
        &self,
        endpoint: &Endpoint,
        body: Value,
    ) -> impl Future<Output = Result<(), FetchError>> + Send {
        self.lock().posts.push((endpoint.clone(), body));
        std::future::ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_response_repeats_once_queue_drains() {
        let source = ScriptedSource::new();
        source.push_ok(Endpoint::Clients, json!(["a"]));
        source.push_ok(Endpoint::Clients, json!(["b"]));

        assert_eq!(source.fetch(&Endpoint::Clients).await, Ok(json!(["a"])));
        assert_eq!(source.fetch(&Endpoint::Clients).await, Ok(json!(["b"])));
        assert_eq!(source.fetch(&Endpoint::Clients).await, Ok(json!(["b"])));
        assert_eq!(source.request_count(&Endpoint::Clients), 3);
    }

    #[tokio::test]
    async fn unscripted_endpoint_fails_as_transport() {
        let source = ScriptedSource::new();
        let err = source
            .fetch(&Endpoint::Filesystem)
            .await
            .expect_err("nothing scripted");
        assert_eq!(err.kind(), "transport");
        assert_eq!(source.requests(), vec![Endpoint::Filesystem]);
    }

    #[tokio::test]
    async fn posts_are_recorded() {
        let source = ScriptedSource::new();
        let endpoint = Endpoint::Revoke("c1".to_string());
        source.post(&endpoint, json!(true)).await.expect("post");
        assert_eq!(source.posts(), vec![(endpoint, json!(true))]);
    }
}
