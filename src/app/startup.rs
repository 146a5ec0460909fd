use super::faults::ProcessFault;
use super::{ComponentState, DashboardOrchestrator};
use crate::error::Result;
use crate::feed::{BusTransport, FeedHandle};
use crate::server::{AppState, DashboardServerBuilder};
use std::sync::Arc;
use tracing::{error, info, warn};

pub(super) const COMPONENTS: [&str; 3] = ["credentials", "feed", "server"];

impl DashboardOrchestrator {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing dashboard components");

        let mut states = self.component_states.lock().await;
        for component in COMPONENTS {
            states.insert(component.to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!(
            "Credential store backend: {:?}, development mode: {}",
            self.credentials.backend(),
            self.loader.dev_mode().is_enabled()
        );
        Ok(())
    }

    /// Seed the feed, then start the push subscription and the HTTP server
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting dashboard");

        // Opened during construction; nothing to spawn
        self.set_component_state("credentials", ComponentState::Running)
            .await;

        self.seed_feed().await;

        self.set_component_state("feed", ComponentState::Starting)
            .await;
        let transport = Arc::new(BusTransport::new(self.event_bus.clone()));
        let mut handle = self.feed.spawn(
            transport,
            &self.config.feed,
            self.cancellation_token.child_token(),
        );
        self.report_feed_failures(&mut handle);
        self.feed_handle = Some(handle);
        self.set_component_state("feed", ComponentState::Running)
            .await;

        self.set_component_state("server", ComponentState::Starting)
            .await;
        let state = AppState::new(
            Arc::clone(&self.config),
            self.event_bus.clone(),
            self.feed.clone(),
            Arc::clone(&self.loader),
            Arc::clone(&self.credentials),
            self.cancellation_token.clone(),
        );
        let server = DashboardServerBuilder::new()
            .config(self.config.server.clone())
            .state(state)
            .build()?;

        let shutdown = self.cancellation_token.clone();
        let reporter = self.fault_reporter.clone();
        self.server_task = Some(tokio::spawn(async move {
            if let Err(e) = server.start(shutdown).await {
                error!("Dashboard server error: {}", e);
                reporter.report(
                    ProcessFault::new("server", e.to_string()).with_code("server_error"),
                );
            }
        }));
        self.set_component_state("server", ComponentState::Running)
            .await;

        info!("Dashboard started on {}", self.config.bind_address());
        Ok(())
    }

    /// Turn a panicked feed task into a process fault
    pub(super) fn report_feed_failures(&self, handle: &mut FeedHandle) {
        let Some(mut failures) = handle.take_failures() else {
            return;
        };
        let reporter = self.fault_reporter.clone();
        tokio::spawn(async move {
            if let Some(e) = failures.recv().await {
                reporter.report(
                    ProcessFault::new("feed", e.to_string()).with_code("feed_task_failed"),
                );
            }
        });
    }

    /// Prime the feed with the recent events and health of an initial load.
    ///
    /// A failed load leaves the feed empty; live updates still arrive.
    async fn seed_feed(&self) {
        match self.loader.load().await {
            Ok(snapshot) => {
                let health = snapshot.integration_health().clone();
                info!(
                    "Seeding live feed with {} events and {} integrations",
                    snapshot.recent_events.len(),
                    health.len()
                );
                self.feed.seed(snapshot.recent_events, health);
            }
            Err(e) => warn!("Initial dashboard load failed, feed starts empty: {}", e),
        }
    }
}
