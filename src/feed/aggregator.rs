use super::transport::PushTransport;
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::events::{Event, IntegrationHealthMap, PushMessage};
use crate::recovery::{FeedRecovery, RecoveryConfig};
use crate::ring_buffer::{EventRingBuffer, RingBufferStats};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Push subscription status as seen by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnection budget spent; serving last-known state
    Exhausted,
    Closed,
}

/// Point-in-time view of the live feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub events: Vec<Event>,
    pub integration_health: IntegrationHealthMap,
    pub connection: ConnectionStatus,
    pub stats: RingBufferStats,
}

struct FeedState {
    events: EventRingBuffer,
    health: IntegrationHealthMap,
    connection: ConnectionStatus,
}

struct FeedShared {
    state: RwLock<FeedState>,
    integrations: BTreeSet<String>,
}

/// Live feed aggregator: bounded recent events plus latest integration health
#[derive(Clone)]
pub struct LiveFeed {
    shared: Arc<FeedShared>,
}

impl LiveFeed {
    /// Create a feed retaining `capacity` events.
    ///
    /// Health keys are restricted to `integrations`; an empty set accepts any key.
    pub fn new(capacity: usize, integrations: impl IntoIterator<Item = String>) -> Self {
        Self {
            shared: Arc::new(FeedShared {
                state: RwLock::new(FeedState {
                    events: EventRingBuffer::new(capacity),
                    health: IntegrationHealthMap::new(),
                    connection: ConnectionStatus::Idle,
                }),
                integrations: integrations.into_iter().collect(),
            }),
        }
    }

    /// Apply one push message
    pub fn apply(&self, message: PushMessage) {
        match message {
            PushMessage::WorkflowEvent(event) => {
                let mut state = self.shared.state.write();
                if let Some(evicted) = state.events.push(event) {
                    debug!("Evicted event {} from live feed", evicted.id);
                }
            }
            PushMessage::IntegrationStatus(health) => {
                let health = self.restrict_to_configured(health);
                self.shared.state.write().health = health;
            }
        }
    }

    /// Seed from a loaded snapshot: events newest-first and the health map
    pub fn seed(&self, events: Vec<Event>, health: IntegrationHealthMap) {
        let health = self.restrict_to_configured(health);
        let mut state = self.shared.state.write();
        state.events.seed(events);
        state.health = health;
    }

    /// Recent events, newest first
    pub fn events(&self) -> Vec<Event> {
        self.shared.state.read().events.events()
    }

    /// Latest integration health
    pub fn health(&self) -> IntegrationHealthMap {
        self.shared.state.read().health.clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared.state.read().connection
    }

    pub fn state(&self) -> FeedSnapshot {
        let state = self.shared.state.read();
        FeedSnapshot {
            events: state.events.events(),
            integration_health: state.health.clone(),
            connection: state.connection,
            stats: state.events.stats(),
        }
    }

    fn set_connection(&self, status: ConnectionStatus) {
        let mut state = self.shared.state.write();
        if state.connection != status {
            debug!("Live feed connection {:?} -> {:?}", state.connection, status);
            state.connection = status;
        }
    }

    fn restrict_to_configured(&self, mut health: IntegrationHealthMap) -> IntegrationHealthMap {
        if self.shared.integrations.is_empty() {
            return health;
        }

        health.retain(|name, _| {
            let known = self.shared.integrations.contains(name);
            if !known {
                warn!("Dropping health for unconfigured integration '{}'", name);
            }
            known
        });
        health
    }

    /// Start the transport pump and the consumer task.
    ///
    /// The transport enqueues onto a bounded queue and a single consumer
    /// applies messages in arrival order.
    pub fn spawn(
        &self,
        transport: Arc<dyn PushTransport>,
        config: &FeedConfig,
        cancel: CancellationToken,
    ) -> FeedHandle {
        let (sender, mut receiver) = mpsc::channel::<PushMessage>(config.queue_capacity);
        let recovery = FeedRecovery::new(
            "live_feed",
            RecoveryConfig::fixed(config.reconnect_attempts, config.reconnect_delay()),
        );

        let consumer_feed = self.clone();
        let consumer = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                consumer_feed.apply(message);
            }
            debug!("Live feed consumer stopped");
        });

        let supervisor_feed = self.clone();
        let supervisor_cancel = cancel.clone();
        let supervisor = tokio::spawn(async move {
            supervisor_feed
                .supervise(transport, sender, recovery, supervisor_cancel)
                .await;
        });

        let (failure_sender, failures) = mpsc::unbounded_channel();
        FeedHandle {
            supervisor: watch_task("supervisor", supervisor, failure_sender.clone()),
            consumer: watch_task("consumer", consumer, failure_sender),
            failures: Some(failures),
            cancel,
        }
    }

    async fn supervise(
        &self,
        transport: Arc<dyn PushTransport>,
        sender: mpsc::Sender<PushMessage>,
        mut recovery: FeedRecovery,
        cancel: CancellationToken,
    ) {
        self.set_connection(ConnectionStatus::Connecting);

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = transport.connect() => result,
            };

            let failure = match connected {
                Ok(mut connection) => {
                    recovery.reset();
                    self.set_connection(ConnectionStatus::Connected);
                    info!("Live feed connected to {}", transport.name());

                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => {
                                self.set_connection(ConnectionStatus::Closed);
                                return;
                            }
                            next = connection.next_message() => next,
                        };

                        match next {
                            Ok(Some(message)) => {
                                if sender.send(message).await.is_err() {
                                    warn!("Live feed consumer gone, stopping subscription");
                                    self.set_connection(ConnectionStatus::Closed);
                                    return;
                                }
                            }
                            Ok(None) => {
                                break FeedError::Disconnected {
                                    details: "closed by peer".to_string(),
                                }
                            }
                            Err(e) => break e,
                        }
                    }
                }
                Err(e) => e,
            };

            warn!("Live feed connection error: {}", failure);
            self.set_connection(ConnectionStatus::Reconnecting {
                attempt: recovery.attempts() + 1,
            });

            let backoff = tokio::select! {
                _ = cancel.cancelled() => break,
                result = recovery.backoff(&failure) => result,
            };

            if let Err(e) = backoff {
                warn!("Live feed continuing with last-known state: {}", e);
                self.set_connection(ConnectionStatus::Exhausted);
                return;
            }
        }

        self.set_connection(ConnectionStatus::Closed);
    }
}

/// Await a feed task and forward a panic as a `TaskFailed` error
fn watch_task(
    task: &'static str,
    handle: JoinHandle<()>,
    failures: mpsc::UnboundedSender<FeedError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            error!("Live feed {} task failed: {}", task, e);
            // Nobody listening is fine; the failure is already logged
            let _ = failures.send(FeedError::TaskFailed {
                task,
                details: e.to_string(),
            });
        }
    })
}

/// Handle on the running feed tasks
pub struct FeedHandle {
    supervisor: JoinHandle<()>,
    consumer: JoinHandle<()>,
    failures: Option<mpsc::UnboundedReceiver<FeedError>>,
    cancel: CancellationToken,
}

impl FeedHandle {
    /// Failures of the feed tasks, available once.
    ///
    /// The channel closes when both tasks have ended.
    pub fn take_failures(&mut self) -> Option<mpsc::UnboundedReceiver<FeedError>> {
        self.failures.take()
    }

    /// Close the push subscription and wait for queued messages to drain
    pub async fn close(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait until the subscription ends on its own
    pub async fn join(self) {
        if let Err(e) = self.supervisor.await {
            warn!("Live feed supervisor watcher failed: {}", e);
        }
        if let Err(e) = self.consumer.await {
            warn!("Live feed consumer watcher failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished() && self.consumer.is_finished()
    }
}
