use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub type ClientId = String;
pub type SessionId = String;
pub type StateId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetail {
    /// Absent on the wire means unconfirmed.
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub sessions: Vec<SessionId>,
    #[serde(default)]
    pub opens: Vec<StateId>,
    #[serde(default)]
    pub delegations: Vec<StateId>,
    #[serde(default)]
    pub layouts: Vec<StateId>,
}

/// One transport connection bound to a session.
///
/// The server encodes channels either as `{"host": .., "port": ..}` or as a
/// pre-joined `"host:port"` string; both decode to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawChannel")]
pub struct Channel {
    pub host: String,
    pub port: u16,
}

impl Channel {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChannel {
    Pair { host: String, port: u16 },
    Joined(String),
}

impl TryFrom<RawChannel> for Channel {
    type Error = String;

    fn try_from(raw: RawChannel) -> Result<Self, Self::Error> {
        match raw {
            RawChannel::Pair { host, port } => Ok(Channel { host, port }),
            RawChannel::Joined(joined) => {
                let (host, port) = joined
                    .rsplit_once(':')
                    .ok_or_else(|| format!("expected host:port, got '{joined}'"))?;
                let port = port
                    .parse::<u16>()
                    .map_err(|err| format!("invalid port in '{joined}': {err}"))?;
                Ok(Channel {
                    host: host.to_string(),
                    port,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// Two-bit share mask: read = 1, write = 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessMask(pub u32);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDetail {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub expiry: String,
    #[serde(default)]
    pub fh: String,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub access: AccessMask,
    #[serde(default)]
    pub deny: AccessMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsStats {
    #[serde(default)]
    pub total_space: Option<u64>,
    #[serde(default)]
    pub free_space: Option<u64>,
    #[serde(default)]
    pub avail_space: Option<u64>,
    #[serde(default)]
    pub total_files: Option<u64>,
    #[serde(default)]
    pub free_files: Option<u64>,
    #[serde(default)]
    pub avail_files: Option<u64>,
    #[serde(default)]
    pub repair_queue_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthState {
    Healthy,
    Restoring,
    Missing,
    Dead,
    Other(String),
}

impl Default for HealthState {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

impl HealthState {
    pub fn as_str(&self) -> &str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Restoring => "restoring",
            HealthState::Missing => "missing",
            HealthState::Dead => "dead",
            HealthState::Other(other) => other,
        }
    }
}

impl From<String> for HealthState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "healthy" => HealthState::Healthy,
            "restoring" => HealthState::Restoring,
            "missing" => HealthState::Missing,
            "dead" => HealthState::Dead,
            _ => HealthState::Other(value),
        }
    }
}

impl From<HealthState> for String {
    fn from(value: HealthState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateColor {
    Green,
    Yellow,
    Orange,
    Red,
}

impl StateColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateColor::Green => "green",
            StateColor::Yellow => "yellow",
            StateColor::Orange => "orange",
            StateColor::Red => "red",
        }
    }
}

impl fmt::Display for StateColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional fields a snapshot leaves out keep their last reconciled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub addresses: Option<Vec<Channel>>,
    #[serde(default)]
    pub state: HealthState,
    #[serde(default)]
    pub total_space: Option<u64>,
    #[serde(default)]
    pub free_space: Option<u64>,
    #[serde(default)]
    pub avail_space: Option<u64>,
    #[serde(default)]
    pub priority: Option<f64>,
    /// Derived from `state` during reconciliation; never read from the wire.
    #[serde(default, skip_deserializing)]
    pub color: Option<StateColor>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub addresses: Option<Vec<Channel>>,
    #[serde(default)]
    pub state: HealthState,
    #[serde(default, skip_deserializing)]
    pub color: Option<StateColor>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesystemSnapshot {
    #[serde(default)]
    pub stats: FsStats,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub replicas: Vec<Replica>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Nfs4,
    Nfs3,
}

impl ProtocolFamily {
    pub const ALL: [ProtocolFamily; 2] = [ProtocolFamily::Nfs4, ProtocolFamily::Nfs3];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::Nfs4 => "nfs4",
            ProtocolFamily::Nfs3 => "nfs3",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolFamily {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "nfs4" | "v4" | "4" => Ok(ProtocolFamily::Nfs4),
            "nfs3" | "v3" | "3" => Ok(ProtocolFamily::Nfs3),
            other => Err(format!("Unknown protocol family: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounters {
    #[serde(default)]
    pub operations: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCount {
    pub name: String,
    pub count: u64,
}

impl OperationCounters {
    /// Flattens the counter map into rows ordered by operation name.
    pub fn into_sorted(self) -> Vec<OperationCount> {
        // BTreeMap iteration already yields byte-wise name order.
        self.operations
            .into_iter()
            .map(|(name, count)| OperationCount { name, count })
            .collect()
    }
}

/// Server version descriptor; opaque to reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionInfo(pub Value);

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(text) => f.write_str(text),
            other => write!(f, "{other}"),
        }
    }
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

/// Timestamps arrive as text or as raw numbers; keep them as display text.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number")),
    }
}
