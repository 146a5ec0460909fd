use super::{ComponentState, DashboardOrchestrator};
use crate::error::{DashboardError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(10);
const FEED_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const CREDENTIALS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code when graceful shutdown does not finish in time
pub const FORCED_EXIT_CODE: i32 = 1;

impl DashboardOrchestrator {
    /// Shut down gracefully, giving up after the configured force timeout.
    ///
    /// Returns the exit code; non-zero if any component failed to stop or
    /// the deadline passed.
    pub async fn shutdown(&mut self) -> i32 {
        let deadline = self.config.shutdown.force_timeout();

        match timeout(deadline, self.graceful_shutdown()).await {
            Ok(exit_code) => exit_code,
            Err(_) => {
                error!(
                    "Graceful shutdown did not finish within {:?}, forcing exit",
                    deadline
                );
                FORCED_EXIT_CODE
            }
        }
    }

    async fn graceful_shutdown(&mut self) -> i32 {
        info!("Beginning graceful shutdown");

        // Stops the server accepting, closes WebSocket relays and the feed
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        let server_task = self.server_task.take();
        let stopped = self
            .stop_component("server", SERVER_STOP_TIMEOUT, async move {
                match server_task {
                    Some(task) => task.await.map_err(|e| DashboardError::Component {
                        component: "server".to_string(),
                        message: e.to_string(),
                    }),
                    None => Ok(()),
                }
            })
            .await;
        if stopped.is_err() {
            exit_code = 1;
        }

        let feed_handle = self.feed_handle.take();
        let stopped = self
            .stop_component("feed", FEED_STOP_TIMEOUT, async move {
                if let Some(handle) = feed_handle {
                    handle.close().await;
                }
                Ok(())
            })
            .await;
        if stopped.is_err() {
            exit_code = 1;
        }

        let credentials = self.credentials.clone();
        let stopped = self
            .stop_component("credentials", CREDENTIALS_STOP_TIMEOUT, async move {
                credentials.flush().await.map_err(DashboardError::from)
            })
            .await;
        if stopped.is_err() {
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        exit_code
    }

    async fn stop_component<F>(&self, component: &str, limit: Duration, stop: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, stop).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(DashboardError::Component {
                    component: component.to_string(),
                    message: format!("stop timed out after {:?}", limit),
                })
            }
        }
    }
}
