use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Live feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Credential store error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl DashboardError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} messages")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Push transport connect failed: {details}")]
    ConnectFailed { details: String },

    #[error("Push transport disconnected: {details}")]
    Disconnected { details: String },

    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Live feed {task} task failed: {details}")]
    TaskFailed { task: &'static str, details: String },

    #[error("Malformed push message: {details}")]
    Malformed { details: String },
}

/// Which of the four snapshot sources a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSourceKind {
    Stats,
    RecentEvents,
    IntegrationHealth,
    Recommendations,
}

impl std::fmt::Display for SnapshotSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SnapshotSourceKind::Stats => "stats",
            SnapshotSourceKind::RecentEvents => "recent_events",
            SnapshotSourceKind::IntegrationHealth => "integration_health",
            SnapshotSourceKind::Recommendations => "recommendations",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Request to {source_kind} failed: {details}")]
    Request {
        source_kind: SnapshotSourceKind,
        details: String,
    },

    #[error("{source_kind} returned HTTP {status}")]
    Status {
        source_kind: SnapshotSourceKind,
        status: u16,
    },

    #[error("Failed to decode {source_kind} response: {details}")]
    Decode {
        source_kind: SnapshotSourceKind,
        details: String,
    },

    #[error("Dashboard failed to load: {}", format_failures(.failures))]
    LoadFailed { failures: Vec<String> },

    #[error("Failed to persist development mode: {0}")]
    DevModePersist(String),
}

fn format_failures(failures: &[String]) -> String {
    failures.join("; ")
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credential file {path}: {details}")]
    Read { path: String, details: String },

    #[error("Failed to write credential file {path}: {details}")]
    Write { path: String, details: String },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

pub type Result<T> = std::result::Result<T, DashboardError>;
