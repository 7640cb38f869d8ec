use nfsmon_core::{ClientId, ProtocolFamily, SessionId, StateId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use url::Url;

/// A read endpoint (or the single write endpoint) exposed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Version,
    Clients,
    Client(ClientId),
    Session(SessionId),
    State { client: ClientId, state: StateId },
    Filesystem,
    Operations(ProtocolFamily),
    Revoke(ClientId),
}

impl Endpoint {
    /// Unencoded path segments; the HTTP source percent-encodes each one.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Endpoint::Version => vec!["version"],
            Endpoint::Clients => vec!["nfs4", "client"],
            Endpoint::Client(client) => vec!["nfs4", "client", client.as_str()],
            Endpoint::Session(session) => vec!["nfs4", "session", session.as_str()],
            Endpoint::State { client, state } => {
                vec!["nfs4", "client", client.as_str(), "state", state.as_str()]
            }
            Endpoint::Filesystem => vec!["fsattr"],
            Endpoint::Operations(family) => vec![family.as_str()],
            Endpoint::Revoke(client) => vec!["nfs4", "client", client.as_str(), "revoke"],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.segments() {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport failure on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },
    #[error("decode failure on {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl FetchError {
    pub fn transport(endpoint: &Endpoint, reason: impl fmt::Display) -> Self {
        FetchError::Transport {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(endpoint: &Endpoint, reason: impl fmt::Display) -> Self {
        FetchError::Decode {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::Decode { .. } => "decode",
        }
    }
}

/// Fetches the current value of a monitored entity.
///
/// Implementations hold no reconciliation state. Each call is independent:
/// no retry, backoff or timeout is applied at this layer.
pub trait SnapshotSource: Clone + Send + Sync + 'static {
    fn fetch(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Value, FetchError>> + Send;

    fn post(
        &self,
        endpoint: &Endpoint,
        body: Value,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

pub fn decode_payload<T: DeserializeOwned>(endpoint: &Endpoint, value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|err| FetchError::decode(endpoint, err))
}

/// One-shot typed fetch, used for values that are read once per view.
pub async fn fetch_once<S, T>(source: &S, endpoint: &Endpoint) -> Result<T, FetchError>
where
    S: SnapshotSource,
    T: DeserializeOwned,
{
    let value = source.fetch(endpoint).await?;
    decode_payload(endpoint, value)
}

#[derive(Clone, Debug)]
pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base: Url) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base })
    }

    pub fn url_for(&self, endpoint: &Endpoint) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::transport(endpoint, "base url cannot carry a path"))?
            .pop_if_empty()
            .extend(endpoint.segments());
        Ok(url)
    }
}

impl SnapshotSource for HttpSource {
    fn fetch(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Value, FetchError>> + Send {
        let client = self.client.clone();
        let target = self.url_for(endpoint);
        let endpoint = endpoint.clone();
        async move {
            let url = target?;
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|err| FetchError::transport(&endpoint, err))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::transport(&endpoint, format!("HTTP {status}")));
            }
            response.json::<Value>().await.map_err(|err| {
                if err.is_decode() {
                    FetchError::decode(&endpoint, err)
                } else {
                    FetchError::transport(&endpoint, err)
                }
            })
        }
    }

    fn post(
        &self,
        endpoint: &Endpoint,
        body: Value,
    ) -> impl Future<Output = Result<(), FetchError>> + Send {
        let client = self.client.clone();
        let target = self.url_for(endpoint);
        let endpoint = endpoint.clone();
        async move {
            let url = target?;
            let response = client
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(|err| FetchError::transport(&endpoint, err))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::transport(&endpoint, format!("HTTP {status}")));
            }
            Ok(())
        }
    }
}
