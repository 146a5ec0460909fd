use crate::error::{EventBusError, FeedError};
use crate::events::{EventBus, EventFilter, EventReceiver, PushMessage};
use async_trait::async_trait;
use tracing::debug;

/// Source of a persistent push subscription
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a new subscription
    async fn connect(&self) -> Result<Box<dyn PushConnection>, FeedError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// One open push subscription, delivering messages in arrival order
#[async_trait]
pub trait PushConnection: Send {
    /// Next message; `Ok(None)` when the peer closed the subscription
    async fn next_message(&mut self) -> Result<Option<PushMessage>, FeedError>;
}

/// In-process transport subscribing to the event bus
pub struct BusTransport {
    bus: EventBus,
}

impl BusTransport {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PushTransport for BusTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, FeedError> {
        debug!("Subscribing live feed to event bus");
        let receiver = EventReceiver::new(self.bus.subscribe(), EventFilter::All, "live_feed");
        Ok(Box::new(BusConnection { receiver }))
    }

    fn name(&self) -> &str {
        "event_bus"
    }
}

struct BusConnection {
    receiver: EventReceiver,
}

#[async_trait]
impl PushConnection for BusConnection {
    async fn next_message(&mut self) -> Result<Option<PushMessage>, FeedError> {
        match self.receiver.recv().await {
            Ok(message) => Ok(Some(message)),
            Err(EventBusError::ChannelClosed) => Ok(None),
            Err(e) => Err(FeedError::Disconnected {
                details: e.to_string(),
            }),
        }
    }
}
