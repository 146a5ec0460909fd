//! Live feed aggregation: a bounded newest-first event buffer and the latest
//! integration health map, kept current by a push subscription.

mod aggregator;
mod transport;
#[cfg(test)]
mod tests;

pub use aggregator::{ConnectionStatus, FeedHandle, FeedSnapshot, LiveFeed};
pub use transport::{BusTransport, PushConnection, PushTransport};
