pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod feed;
pub mod mobile;
pub mod recovery;
pub mod ring_buffer;
pub mod server;
pub mod snapshot;
pub mod source;

pub use app::{ComponentState, DashboardOrchestrator, ProcessFault, ShutdownReason};
pub use config::DashboardConfig;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{DashboardError, Result};
pub use events::{Event, EventBus, EventFilter, EventReceiver, IntegrationHealthMap, PushMessage};
pub use feed::{ConnectionStatus, FeedSnapshot, LiveFeed};
pub use mobile::{ClientClassification, ConnectionType};
pub use server::{create_router, AppState, DashboardServer};
pub use snapshot::{DashboardSnapshot, SnapshotLoader, SnapshotSource};
