use super::{BusTransport, ConnectionStatus, LiveFeed, PushConnection, PushTransport};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::events::{
    Event, EventBus, HealthState, IntegrationHealth, IntegrationHealthMap, PushMessage, RecordId,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn event(id: u64) -> Event {
    Event {
        id: RecordId::Number(id),
        event_type: "call_completed".to_string(),
        client: "Acme Corp".to_string(),
        status: "completed".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        description: format!("event {}", id),
        related_clients: vec![],
        related_tasks: vec![],
        actionable: false,
    }
}

fn health(entries: &[(&str, bool)]) -> IntegrationHealthMap {
    entries
        .iter()
        .map(|(name, healthy)| {
            (
                name.to_string(),
                IntegrationHealth {
                    is_healthy: *healthy,
                    last_check_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
                    status: if *healthy {
                        HealthState::Healthy
                    } else {
                        HealthState::Error
                    },
                },
            )
        })
        .collect()
}

fn integrations() -> Vec<String> {
    ["accelo", "fireflies", "google_analytics", "slack"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn feed_ids(feed: &LiveFeed) -> Vec<RecordId> {
    feed.events().into_iter().map(|e| e.id).collect()
}

/// Transport replaying a script: each connect pops one entry, and an empty
/// script refuses connections.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Vec<PushMessage>, FeedError>>>,
    connects: AtomicUsize,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<Vec<PushMessage>, FeedError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            connects: AtomicUsize::new(0),
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct ScriptedConnection {
    messages: VecDeque<PushMessage>,
}

#[async_trait]
impl PushConnection for ScriptedConnection {
    async fn next_message(&mut self) -> Result<Option<PushMessage>, FeedError> {
        match self.messages.pop_front() {
            Some(message) => Ok(Some(message)),
            None => Err(FeedError::Disconnected {
                details: "script finished".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, FeedError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Ok(messages)) => Ok(Box::new(ScriptedConnection {
                messages: messages.into(),
            })),
            Some(Err(e)) => Err(e),
            None => Err(FeedError::ConnectFailed {
                details: "connection refused".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Transport whose connect panics
struct PanickingTransport;

#[async_trait]
impl PushTransport for PanickingTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, FeedError> {
        panic!("transport exploded")
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

fn refused() -> FeedError {
    FeedError::ConnectFailed {
        details: "connection refused".to_string(),
    }
}

#[test]
fn test_workflow_events_are_bounded_and_newest_first() {
    let feed = LiveFeed::new(10, integrations());

    for id in 1..=15 {
        feed.apply(PushMessage::WorkflowEvent(event(id)));
        assert!(feed.events().len() <= 10);
    }

    let expected: Vec<RecordId> = (6..=15).rev().map(RecordId::Number).collect();
    assert_eq!(feed_ids(&feed), expected);
}

#[test]
fn test_integration_status_is_full_replace() {
    let feed = LiveFeed::new(10, integrations());

    feed.apply(PushMessage::IntegrationStatus(health(&[
        ("accelo", true),
        ("slack", false),
    ])));
    feed.apply(PushMessage::IntegrationStatus(health(&[("fireflies", true)])));

    assert_eq!(feed.health(), health(&[("fireflies", true)]));
    assert!(!feed.health().contains_key("slack"));
}

#[test]
fn test_unconfigured_integrations_are_dropped() {
    let feed = LiveFeed::new(10, integrations());

    feed.apply(PushMessage::IntegrationStatus(health(&[
        ("accelo", true),
        ("hubspot", true),
    ])));

    assert_eq!(feed.health(), health(&[("accelo", true)]));
}

#[test]
fn test_empty_integration_set_accepts_any_key() {
    let feed = LiveFeed::new(10, Vec::new());
    feed.apply(PushMessage::IntegrationStatus(health(&[("hubspot", true)])));
    assert!(feed.health().contains_key("hubspot"));
}

#[test]
fn test_seed_then_push() {
    let feed = LiveFeed::new(3, integrations());
    feed.seed(vec![event(3), event(2), event(1)], health(&[("slack", false)]));

    feed.apply(PushMessage::WorkflowEvent(event(4)));

    assert_eq!(
        feed_ids(&feed),
        vec![RecordId::Number(4), RecordId::Number(3), RecordId::Number(2)]
    );
    assert_eq!(feed.state().integration_health, health(&[("slack", false)]));
}

#[tokio::test]
async fn test_bus_transport_feeds_aggregator() {
    let bus = EventBus::new(16);
    let feed = LiveFeed::new(10, integrations());
    let cancel = CancellationToken::new();
    let handle = feed.spawn(
        Arc::new(BusTransport::new(bus.clone())),
        &FeedConfig::default(),
        cancel.clone(),
    );

    // Wait for the subscription before publishing
    tokio::time::timeout(Duration::from_secs(1), async {
        while !bus.has_subscribers() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    bus.publish(PushMessage::WorkflowEvent(event(1))).unwrap();
    bus.publish(PushMessage::WorkflowEvent(event(2))).unwrap();
    bus.publish(PushMessage::IntegrationStatus(health(&[("accelo", true)])))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while feed.health().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(feed_ids(&feed), vec![RecordId::Number(2), RecordId::Number(1)]);
    assert_eq!(feed.connection_status(), ConnectionStatus::Connected);

    handle.close().await;
    assert_eq!(feed.connection_status(), ConnectionStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_keeps_last_known_state() {
    let transport = ScriptedTransport::new(vec![Ok(vec![
        PushMessage::WorkflowEvent(event(1)),
        PushMessage::WorkflowEvent(event(2)),
        PushMessage::IntegrationStatus(health(&[("slack", false)])),
    ])]);
    let feed = LiveFeed::new(10, integrations());
    let start = tokio::time::Instant::now();

    let handle = feed.spawn(
        transport.clone(),
        &FeedConfig::default(),
        CancellationToken::new(),
    );
    handle.join().await;

    // One initial connection plus five reconnect attempts, one second apart
    assert_eq!(transport.connects(), 6);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(feed.connection_status(), ConnectionStatus::Exhausted);
    assert_eq!(feed_ids(&feed), vec![RecordId::Number(2), RecordId::Number(1)]);
    assert_eq!(feed.health(), health(&[("slack", false)]));
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_attempts() {
    let transport = ScriptedTransport::new(vec![
        Ok(vec![PushMessage::WorkflowEvent(event(1))]),
        Err(refused()),
        Err(refused()),
        Ok(vec![PushMessage::WorkflowEvent(event(2))]),
    ]);
    let feed = LiveFeed::new(10, integrations());

    let handle = feed.spawn(
        transport.clone(),
        &FeedConfig::default(),
        CancellationToken::new(),
    );
    handle.join().await;

    assert_eq!(transport.connects(), 9);
    assert_eq!(feed_ids(&feed), vec![RecordId::Number(2), RecordId::Number(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_closes_feed() {
    let transport = ScriptedTransport::new(vec![]);
    let feed = LiveFeed::new(10, integrations());
    let cancel = CancellationToken::new();

    let mut handle = feed.spawn(transport.clone(), &FeedConfig::default(), cancel.clone());
    let mut failures = handle.take_failures().unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.close().await;

    assert_eq!(feed.connection_status(), ConnectionStatus::Closed);
    assert!(transport.connects() < 6);
    assert!(failures.recv().await.is_none());
}

#[tokio::test]
async fn test_panicked_task_is_reported() {
    let feed = LiveFeed::new(10, integrations());
    let mut handle = feed.spawn(
        Arc::new(PanickingTransport),
        &FeedConfig::default(),
        CancellationToken::new(),
    );
    let mut failures = handle.take_failures().unwrap();
    assert!(handle.take_failures().is_none());

    let failure = tokio::time::timeout(Duration::from_secs(1), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        failure,
        FeedError::TaskFailed {
            task: "supervisor",
            ..
        }
    ));

    // The consumer ends cleanly once the supervisor's sender is gone
    handle.join().await;
    assert!(failures.recv().await.is_none());
}
