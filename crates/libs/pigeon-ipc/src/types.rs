use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Type aliases ──────────────────────────────────────────────────────────────

/// Hex-encoded message identifier.
pub type MessageId = String;

/// Hex-encoded peer/destination hash.
pub type PeerHash = String;

// ── Service status ────────────────────────────────────────────────────────────

/// Lifecycle status of the service process.
///
/// Exactly one value holds at any instant. The wire encoding is the legacy
/// string form: `"SHUTDOWN"`, `"INITIALIZING"`, `"READY"`, `"RESTARTING"`,
/// `"ERROR:<message>"`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceStatus {
    #[default]
    Shutdown,
    Initializing,
    Ready,
    Restarting,
    Error(String),
}

impl ServiceStatus {
    /// Domain operations are only accepted in `Ready`.
    pub fn accepts_domain_calls(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("SHUTDOWN"),
            Self::Initializing => f.write_str("INITIALIZING"),
            Self::Ready => f.write_str("READY"),
            Self::Restarting => f.write_str("RESTARTING"),
            Self::Error(message) => write!(f, "ERROR:{message}"),
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SHUTDOWN" => Ok(Self::Shutdown),
            "INITIALIZING" => Ok(Self::Initializing),
            "READY" => Ok(Self::Ready),
            "RESTARTING" => Ok(Self::Restarting),
            other => match other.strip_prefix("ERROR:") {
                Some(message) => Ok(Self::Error(message.to_string())),
                None => Err(format!("unknown service status: {other}")),
            },
        }
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// One enabled network interface in the initialize blob.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InterfaceConfig {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_enabled() -> bool {
    true
}

/// The JSON configuration blob accepted by `initialize`.
///
/// Aliases keep the legacy camelCase keys readable.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(alias = "storagePath")]
    pub storage_path: String,
    #[serde(default, alias = "enabledInterfaces")]
    pub enabled_interfaces: Vec<InterfaceConfig>,
    #[serde(default = "default_log_level", alias = "logLevel")]
    pub log_level: String,
    #[serde(default, alias = "allowAnonymous")]
    pub allow_anonymous: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

// ── Identity ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityInfo {
    pub identity_hash: String,
    pub destination_hash: String,
    pub display_name: Option<String>,
}

// ── Messaging ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageInfo {
    pub id: MessageId,
    pub source_hash: PeerHash,
    pub destination_hash: PeerHash,
    pub timestamp: i64,
    pub content: String,
    pub title: Option<String>,
    pub status: String,
    pub is_outgoing: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SendMessageRequest {
    pub destination_hash: PeerHash,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub attachment: Option<Vec<u8>>,
    #[serde(default)]
    pub attachment_name: Option<String>,
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PathInfo {
    pub destination_hash: PeerHash,
    pub hops: Option<u32>,
    pub next_hop: Option<String>,
    pub interface: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnounceInfo {
    pub destination_hash: PeerHash,
    pub timestamp: i64,
    pub display_name: Option<String>,
    #[serde(default)]
    pub app_data: Option<Vec<u8>>,
    #[serde(default)]
    pub hops: Option<u32>,
}

// ── Debug info ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DebugInfo {
    pub status: String,
    pub generation: u64,
    pub engine_attached: bool,
    pub teardown_started: bool,
    /// Seconds since the current engine was attached, when one is.
    #[serde(default)]
    pub uptime_secs: Option<u64>,
    pub storage_path: Option<String>,
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub engine: Option<serde_json::Value>,
}

// ── Initialization results ────────────────────────────────────────────────────

/// Payload delivered through `ServiceCallback::on_initialization_complete`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InitResult {
    pub generation: u64,
    pub identity: Option<IdentityInfo>,
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Asynchronous events surfaced across the process boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub enum ServiceEvent {
    StatusChanged { status: String },
    MessageReceived { message: MessageInfo },
    AnnounceReceived { announce: AnnounceInfo },
    InitializationComplete { result: InitResult },
    InitializationError { error: String },
}
