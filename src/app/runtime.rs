use super::faults::{FaultAction, ProcessFault};
use super::{DashboardOrchestrator, ShutdownReason, ShutdownTrigger};
use crate::error::{DashboardError, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

impl DashboardOrchestrator {
    /// Run until a signal, a shutdown request or a fatal fault, then shut down.
    ///
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Dashboard is running");

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| DashboardError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        let mut faults = self
            .fault_receiver
            .take()
            .ok_or_else(|| DashboardError::System {
                message: "Fault receiver already taken".to_string(),
            })?;

        self.setup_signal_handlers();

        let reason = self.wait_for_shutdown(shutdown_receiver, &mut faults).await?;
        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await.max(reason.exit_code());

        info!("Dashboard shutdown complete");
        Ok(exit_code)
    }

    async fn wait_for_shutdown(
        &self,
        mut shutdown: oneshot::Receiver<ShutdownReason>,
        faults: &mut mpsc::UnboundedReceiver<ProcessFault>,
    ) -> Result<ShutdownReason> {
        loop {
            tokio::select! {
                reason = &mut shutdown => {
                    return reason.map_err(|_| DashboardError::System {
                        message: "Shutdown channel closed unexpectedly".to_string(),
                    });
                }
                Some(fault) = faults.recv() => {
                    if self.fault_policy.evaluate(&fault) == FaultAction::Shutdown {
                        return Ok(ShutdownReason::Error(fault.to_string()));
                    }
                }
            }
        }
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM from the service manager
        #[cfg(unix)]
        {
            let trigger = self.shutdown_trigger.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};

                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            fire(&trigger, "SIGTERM").await;
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        let trigger = self.shutdown_trigger.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    fire(&trigger, "SIGINT").await;
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }
}

async fn fire(trigger: &ShutdownTrigger, signal: &str) {
    trigger
        .trigger(ShutdownReason::Signal(signal.to_string()))
        .await;
}
