use crate::error::EventBusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Record identity as emitted by the backend: numeric database ids or string keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

/// A workflow event shown in the dashboard feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub client: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub related_clients: Vec<String>,
    #[serde(default)]
    pub related_tasks: Vec<String>,
    #[serde(default)]
    pub actionable: bool,
}

/// Health state reported for an integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationHealth {
    pub is_healthy: bool,
    pub last_check_at: DateTime<Utc>,
    pub status: HealthState,
}

/// Latest-known health keyed by integration name
pub type IntegrationHealthMap = BTreeMap<String, IntegrationHealth>;

/// Messages delivered over the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    /// A new workflow event to prepend to the feed
    WorkflowEvent(Event),
    /// A full replacement of the integration health map
    IntegrationStatus(IntegrationHealthMap),
}

impl PushMessage {
    /// Message kind as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            PushMessage::WorkflowEvent(_) => "workflow_event",
            PushMessage::IntegrationStatus(_) => "integration_status",
        }
    }

    /// Human-readable summary for logs
    pub fn description(&self) -> String {
        match self {
            PushMessage::WorkflowEvent(event) => format!(
                "{} for {} ({}): {}",
                event.event_type, event.client, event.status, event.description
            ),
            PushMessage::IntegrationStatus(health) => {
                let unhealthy = health.values().filter(|h| !h.is_healthy).count();
                format!(
                    "Integration status for {} integrations ({} unhealthy)",
                    health.len(),
                    unhealthy
                )
            }
        }
    }
}

/// Async event bus fanning push messages out to every subscriber
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PushMessage>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to messages and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.sender.subscribe()
    }

    /// Publish a message to all subscribers.
    ///
    /// Returns the number of subscribers that received it. Publishing with no
    /// subscribers is not an error: nobody is listening yet.
    pub fn publish(&self, message: PushMessage) -> Result<usize, EventBusError> {
        debug!("Publishing {}: {}", message.kind(), message.description());

        if let PushMessage::IntegrationStatus(health) = &message {
            for (name, status) in health.iter().filter(|(_, h)| !h.is_healthy) {
                warn!("Integration {} reported {:?}", name, status.status);
            }
        }

        if self.sender.receiver_count() == 0 {
            debug!("No subscribers for {}", message.kind());
            return Ok(0);
        }

        self.sender
            .send(message)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Message filter for selective subscriptions
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all messages
    All,
    /// Accept only the listed message kinds
    Kinds(Vec<String>),
}

impl EventFilter {
    /// Build a filter from a comma separated list of kinds; empty means all
    pub fn from_kinds(kinds: &str) -> Self {
        let kinds: Vec<String> = kinds
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        if kinds.is_empty() {
            EventFilter::All
        } else {
            EventFilter::Kinds(kinds)
        }
    }

    /// Check if a message passes this filter
    pub fn matches(&self, message: &PushMessage) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.iter().any(|k| k == message.kind()),
        }
    }
}

/// Named receiver with filtering on top of a bus subscription
pub struct EventReceiver {
    receiver: broadcast::Receiver<PushMessage>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<PushMessage>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next message that passes the filter
    pub async fn recv(&mut self) -> Result<PushMessage, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    if self.filter.matches(&message) {
                        debug!("Receiver '{}' received {}", self.name, message.kind());
                        return Ok(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} messages", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
