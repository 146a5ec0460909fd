//! Integration tests for the dashboard HTTP API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use cia_dashboard::config::DashboardConfig;
use cia_dashboard::credentials::MemoryCredentialStore;
use cia_dashboard::error::{SnapshotError, SnapshotSourceKind};
use cia_dashboard::events::{Event, EventBus, IntegrationHealthMap};
use cia_dashboard::feed::{BusTransport, FeedHandle, LiveFeed};
use cia_dashboard::snapshot::{
    DashboardStats, DevMode, Recommendation, SnapshotLoader, SnapshotSource,
};
use cia_dashboard::{create_router, AppState};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test helpers
// ============================================================================

/// Backend that is down: every fetch fails with 503
struct UnreachableBackend;

fn unavailable(kind: SnapshotSourceKind) -> SnapshotError {
    SnapshotError::Status {
        source_kind: kind,
        status: 503,
    }
}

#[async_trait]
impl SnapshotSource for UnreachableBackend {
    async fn stats(&self) -> Result<DashboardStats, SnapshotError> {
        Err(unavailable(SnapshotSourceKind::Stats))
    }

    async fn recent_events(&self, _limit: usize) -> Result<Vec<Event>, SnapshotError> {
        Err(unavailable(SnapshotSourceKind::RecentEvents))
    }

    async fn integration_health(&self) -> Result<IntegrationHealthMap, SnapshotError> {
        Err(unavailable(SnapshotSourceKind::IntegrationHealth))
    }

    async fn pending_recommendations(&self) -> Result<Vec<Recommendation>, SnapshotError> {
        Err(unavailable(SnapshotSourceKind::Recommendations))
    }
}

struct Harness {
    server: TestServer,
    bus: EventBus,
    feed: FeedHandle,
}

impl Harness {
    async fn new(dev_mode: bool) -> Self {
        let config = DashboardConfig::default();
        let bus = EventBus::new(config.events.bus_capacity);
        let live_feed = LiveFeed::new(config.feed.capacity, config.integrations.names.clone());
        let loader = Arc::new(
            SnapshotLoader::new(
                Arc::new(UnreachableBackend),
                Arc::new(DevMode::in_memory(dev_mode)),
                config.snapshot.recent_events_limit,
            )
            .with_integrations(config.integrations.names.clone()),
        );

        let feed = live_feed.spawn(
            Arc::new(BusTransport::new(bus.clone())),
            &config.feed,
            CancellationToken::new(),
        );

        let state = AppState::new(
            Arc::new(config),
            bus.clone(),
            live_feed,
            loader,
            Arc::new(MemoryCredentialStore::new()),
            CancellationToken::new(),
        );
        let server = TestServer::new(create_router(state)).expect("test server");

        let harness = Self { server, bus, feed };
        harness.wait_for_feed_subscription().await;
        harness
    }

    async fn wait_for_feed_subscription(&self) {
        for _ in 0..100 {
            if self.bus.has_subscribers() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("live feed never subscribed");
    }

    /// Poll the feed endpoint until it holds `count` events
    async fn wait_for_events(&self, count: usize) -> Value {
        for _ in 0..100 {
            let body: Value = self.server.get("/api/dashboard/feed").await.json();
            if body["events"].as_array().map(Vec::len) == Some(count) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feed never reached {} events", count);
    }

    async fn close(self) {
        self.feed.close().await;
    }
}

fn iphone() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("user-agent"),
        HeaderValue::from_static("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
    )
}

// ============================================================================
// Health endpoint
// ============================================================================

#[tokio::test]
async fn test_health_returns_ok() {
    let harness = Harness::new(false).await;
    let response = harness.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].as_str().is_some());
    assert!(body["feed"]["connection"]["state"].is_string());
    assert_eq!(body["snapshot"]["state"], "not_loaded");
    assert_eq!(body["dev_mode"], false);

    harness.close().await;
}

// ============================================================================
// Snapshot and development mode
// ============================================================================

#[tokio::test]
async fn test_snapshot_unavailable_without_dev_mode() {
    let harness = Harness::new(false).await;
    let response = harness.server.get("/api/dashboard/snapshot").await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let body: Value = response.json();
    assert_eq!(body["code"], "SNAPSHOT_UNAVAILABLE");
    assert!(body["error"].as_str().unwrap().contains("stats"));

    let health: Value = harness.server.get("/health").await.json();
    assert_eq!(health["snapshot"]["state"], "failed");

    harness.close().await;
}

#[tokio::test]
async fn test_snapshot_falls_back_to_mock_in_dev_mode() {
    let harness = Harness::new(true).await;
    let response = harness.server.get("/api/dashboard/snapshot").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["stats"]["activeClients"], 12);
    assert_eq!(body["stats"]["revenue"], 125000);
    assert_eq!(body["recent_events"].as_array().unwrap().len(), 5);
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 6);
    assert_eq!(body["sources"]["stats"], "mock");
    assert_eq!(body["sources"]["recommendations"], "mock");

    harness.close().await;
}

#[tokio::test]
async fn test_toggle_dev_mode() {
    let harness = Harness::new(false).await;

    let body: Value = harness.server.get("/api/dev-mode").await.json();
    assert_eq!(body["enabled"], false);

    let response = harness
        .server
        .put("/api/dev-mode")
        .json(&json!({ "enabled": true }))
        .await;
    response.assert_status_ok();

    let body: Value = harness.server.get("/api/dev-mode").await.json();
    assert_eq!(body["enabled"], true);

    harness
        .server
        .get("/api/dashboard/snapshot")
        .await
        .assert_status_ok();

    harness.close().await;
}

// ============================================================================
// Live feed ingestion
// ============================================================================

#[tokio::test]
async fn test_ingested_events_appear_newest_first() {
    let harness = Harness::new(false).await;

    for (id, kind) in [(1, "call_completed"), (2, "task_created")] {
        let response = harness
            .server
            .post("/api/events")
            .json(&json!({
                "id": id,
                "event_type": kind,
                "client_name": "Acme Corp",
                "status": "completed",
                "timestamp": "2024-01-15T12:00:00Z",
            }))
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        harness.wait_for_events(id).await;
    }

    let body = harness.wait_for_events(2).await;
    assert_eq!(body["events"][0]["id"], 2);
    assert_eq!(body["events"][0]["type"], "task_created");
    assert_eq!(body["events"][0]["client"], "Acme Corp");
    assert_eq!(body["events"][1]["id"], 1);

    harness.close().await;
}

#[tokio::test]
async fn test_event_without_type_is_rejected() {
    let harness = Harness::new(false).await;
    let response = harness
        .server
        .post("/api/events")
        .json(&json!({ "client": "Acme Corp" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");

    harness.close().await;
}

#[tokio::test]
async fn test_integration_status_replaces_health() {
    let harness = Harness::new(false).await;
    let response = harness
        .server
        .post("/api/push")
        .json(&json!({
            "event": "integration_status",
            "data": {
                "slack": { "is_healthy": false },
                "accelo": { "is_healthy": true },
            },
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>()["event"], "integration_status");

    for _ in 0..100 {
        let body: Value = harness.server.get("/api/dashboard/feed").await.json();
        if body["integration_health"]["slack"]["status"] == "error" {
            assert_eq!(body["integration_health"]["accelo"]["status"], "healthy");
            harness.close().await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("integration health never updated");
}

#[tokio::test]
async fn test_unknown_push_kind_is_rejected() {
    let harness = Harness::new(false).await;
    harness
        .server
        .post("/api/push")
        .json(&json!({ "event": "presence", "data": {} }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    harness.close().await;
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_credentials_merge_later_wins() {
    let harness = Harness::new(false).await;

    for update in [json!({ "a": 1 }), json!({ "b": 2 }), json!({ "a": 3 })] {
        harness
            .server
            .post("/api/integrations/credentials")
            .json(&json!({ "credentials": update }))
            .await
            .assert_status_ok();
    }

    let response = harness.server.get("/api/integrations/credentials").await;
    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), "no-store");
    assert_eq!(response.json::<Value>(), json!({ "a": 3, "b": 2 }));

    harness.close().await;
}

#[tokio::test]
async fn test_credentials_missing_or_null_is_empty_update() {
    let harness = Harness::new(false).await;
    harness
        .server
        .post("/api/integrations/credentials")
        .json(&json!({ "credentials": { "slack_token": "xoxb-1" } }))
        .await
        .assert_status_ok();

    for body in [json!({}), json!({ "credentials": null })] {
        let response = harness
            .server
            .post("/api/integrations/credentials")
            .json(&body)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!({ "status": "ok" }));
    }

    let stored: Value = harness.server.get("/api/integrations/credentials").await.json();
    assert_eq!(stored, json!({ "slack_token": "xoxb-1" }));

    harness.close().await;
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let harness = Harness::new(false).await;
    let response = harness
        .server
        .post("/api/integrations/credentials")
        .bytes(Bytes::from_static(b"{not json"))
        .content_type("application/json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");

    harness.close().await;
}

// ============================================================================
// Mobile adaptation
// ============================================================================

#[tokio::test]
async fn test_mobile_feed_carries_metadata() {
    let harness = Harness::new(false).await;
    let (name, value) = iphone();
    let response = harness
        .server
        .get("/api/dashboard/feed")
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    assert_eq!(response.header("x-mobile-optimized"), "true");
    assert!(response
        .header("cache-control")
        .to_str()
        .unwrap()
        .contains("max-age"));

    let body: Value = response.json();
    assert_eq!(body["_mobile"]["optimized"], true);
    assert_eq!(body["_mobile"]["connectionType"], "fast");

    harness.close().await;
}

#[tokio::test]
async fn test_mobile_error_envelope() {
    let harness = Harness::new(false).await;
    let (name, value) = iphone();
    let response = harness
        .server
        .get("/api/dashboard/snapshot")
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "SNAPSHOT_UNAVAILABLE");
    assert_eq!(body["error"]["mobile"], true);
    assert!(body["error"]["message"].as_str().is_some());

    harness.close().await;
}

#[tokio::test]
async fn test_desktop_response_unmodified() {
    let harness = Harness::new(false).await;
    let response = harness.server.get("/api/dashboard/feed").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert!(body.get("_mobile").is_none());
    assert!(response.headers().get("x-mobile-optimized").is_none());

    harness.close().await;
}
