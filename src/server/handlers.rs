use super::error::ApiError;
use super::state::AppState;
use crate::events::PushMessage;
use crate::source::{normalize_event, normalize_health, normalize_message};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Service liveness with live feed and snapshot status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let feed = state.feed.state();

    let health_info = json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
        "feed": {
            "connection": feed.connection,
            "events": feed.events.len(),
            "integrations": feed.integration_health.len(),
            "stats": feed.stats,
        },
        "snapshot": state.loader.state(),
        "dev_mode": state.loader.dev_mode().is_enabled(),
        "subscribers": state.event_bus.subscriber_count(),
    });

    (StatusCode::OK, Json(health_info))
}

/// Load a fresh dashboard snapshot from the four sources
pub async fn snapshot_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.loader.load().await?;
    Ok(Json(snapshot))
}

/// Current live feed: recent events, integration health, connection status
pub async fn feed_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.feed.state())
}

#[derive(Debug, Deserialize)]
pub struct DevModeUpdate {
    pub enabled: bool,
}

pub async fn get_dev_mode_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "enabled": state.loader.dev_mode().is_enabled() }))
}

pub async fn set_dev_mode_handler(
    State(state): State<AppState>,
    payload: Result<Json<DevModeUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(update) = payload?;
    state.loader.dev_mode().set(update.enabled).await?;
    Ok(Json(json!({ "enabled": update.enabled })))
}

/// Ingest a raw workflow event and publish it to every subscriber
pub async fn ingest_event_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(raw) = payload?;
    let event = normalize_event(raw, Utc::now())?;
    let id = event.id.clone();

    let delivered = state.event_bus.publish(PushMessage::WorkflowEvent(event))?;
    debug!("Workflow event {} delivered to {} subscribers", id, delivered);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "published", "id": id, "delivered": delivered })),
    ))
}

/// Ingest a raw integration health report as a full replacement
pub async fn ingest_integration_status_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(raw) = payload?;
    let health = normalize_health(raw, Utc::now())?;
    let integrations = health.len();

    let delivered = state
        .event_bus
        .publish(PushMessage::IntegrationStatus(health))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "published",
            "integrations": integrations,
            "delivered": delivered,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Ingest a message in the push channel's `{"event", "data"}` framing
pub async fn ingest_push_handler(
    State(state): State<AppState>,
    payload: Result<Json<PushEnvelope>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(envelope) = payload?;
    let message = normalize_message(&envelope.event, envelope.data, Utc::now())?;
    let kind = message.kind();

    let delivered = state.event_bus.publish(message)?;
    debug!("{} delivered to {} subscribers", kind, delivered);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "published", "event": kind, "delivered": delivered })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CredentialsUpdate {
    /// Missing or null is an empty update
    #[serde(default)]
    pub credentials: Option<Map<String, Value>>,
}

pub async fn get_credentials_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.credentials.get().await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(credentials)))
}

pub async fn save_credentials_handler(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(update) = payload?;
    let credentials = update.credentials.unwrap_or_default();
    let keys = credentials.len();

    state.credentials.save(credentials).await?;
    info!("Saved {} integration credential entries", keys);

    Ok(Json(json!({ "status": "ok" })))
}
