use super::faults::{FaultPolicy, FaultReporter, ProcessFault};
use super::{ComponentState, ShutdownReason, ShutdownTrigger};
use crate::config::DashboardConfig;
use crate::credentials::{open_store, CredentialStore};
use crate::error::Result;
use crate::events::EventBus;
use crate::feed::{FeedHandle, LiveFeed};
use crate::snapshot::{DevMode, HttpSnapshotSource, SnapshotLoader, SnapshotSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns every dashboard component and drives startup, the run loop and
/// graceful shutdown.
pub struct DashboardOrchestrator {
    pub(super) config: Arc<DashboardConfig>,
    pub(super) event_bus: EventBus,
    pub(super) feed: LiveFeed,
    pub(super) loader: Arc<SnapshotLoader>,
    pub(super) credentials: Arc<dyn CredentialStore>,

    pub(super) feed_handle: Option<FeedHandle>,
    pub(super) server_task: Option<JoinHandle<()>>,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) fault_policy: FaultPolicy,
    pub(super) fault_reporter: FaultReporter,
    pub(super) fault_receiver: Option<mpsc::UnboundedReceiver<ProcessFault>>,
    pub(super) cancellation_token: CancellationToken,
}

impl DashboardOrchestrator {
    /// Build the orchestrator with the HTTP snapshot source from config
    pub async fn new(config: DashboardConfig) -> Result<Self> {
        let source = Arc::new(HttpSnapshotSource::new(&config.snapshot)?);
        Self::with_source(config, source).await
    }

    /// Build the orchestrator around a caller-supplied snapshot source
    pub async fn with_source(
        config: DashboardConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<Self> {
        info!("Creating dashboard orchestrator");

        let event_bus = EventBus::new(config.events.bus_capacity);
        let feed = LiveFeed::new(config.feed.capacity, config.integrations.names.clone());
        let dev_mode = Arc::new(DevMode::load(&config.dev_mode));
        let loader = Arc::new(
            SnapshotLoader::new(source, dev_mode, config.snapshot.recent_events_limit)
                .with_integrations(config.integrations.names.clone()),
        );
        let credentials = open_store(&config.credentials).await?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let (fault_reporter, fault_receiver) = FaultReporter::channel();
        let fault_policy = FaultPolicy::new(config.shutdown.ignored_fault_codes.clone());

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            feed,
            loader,
            credentials,
            feed_handle: None,
            server_task: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_trigger: ShutdownTrigger::new(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            fault_policy,
            fault_reporter,
            fault_receiver: Some(fault_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    /// Handle for requesting shutdown from outside the run loop
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown_trigger.clone()
    }

    /// Handle for background tasks to report process faults
    pub fn fault_reporter(&self) -> FaultReporter {
        self.fault_reporter.clone()
    }
}
