use crate::config::DashboardConfig;
use crate::credentials::CredentialStore;
use crate::events::EventBus;
use crate::feed::LiveFeed;
use crate::snapshot::SnapshotLoader;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<DashboardConfig>,
    pub(crate) event_bus: EventBus,
    pub(crate) feed: LiveFeed,
    pub(crate) loader: Arc<SnapshotLoader>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    /// Cancelled on shutdown; long-lived WebSocket relays watch it
    pub(crate) shutdown: CancellationToken,
    pub(crate) started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<DashboardConfig>,
        event_bus: EventBus,
        feed: LiveFeed,
        loader: Arc<SnapshotLoader>,
        credentials: Arc<dyn CredentialStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_bus,
            feed,
            loader,
            credentials,
            shutdown,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }
}
