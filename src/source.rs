//! Normalizes heterogeneous backend payloads into [`PushMessage`]s.
//!
//! Workflow events arrive from several producers that disagree on field
//! names (`type` vs `event_type`, `client` vs `client_name`), on timestamp
//! encoding (RFC 3339 or epoch milliseconds) and on whether an id is present.
//! Health reports may omit the derived `status` or the check time.

use crate::error::FeedError;
use crate::events::{
    Event, HealthState, IntegrationHealth, IntegrationHealthMap, PushMessage, RecordId,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
    #[serde(default)]
    created_at: Option<RawTimestamp>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    related_clients: Vec<String>,
    #[serde(default)]
    related_tasks: Vec<String>,
    #[serde(default)]
    actionable: bool,
}

#[derive(Debug, Deserialize)]
struct RawHealth {
    is_healthy: bool,
    #[serde(default)]
    last_check_at: Option<RawTimestamp>,
    #[serde(default)]
    status: Option<HealthState>,
}

/// Normalize a raw workflow event, stamping `now` where the producer gave no time
pub fn normalize_event(raw: Value, now: DateTime<Utc>) -> Result<Event, FeedError> {
    let raw: RawEvent = serde_json::from_value(raw).map_err(|e| FeedError::Malformed {
        details: format!("workflow event: {}", e),
    })?;

    let event_type = raw
        .kind
        .or(raw.event_type)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FeedError::Malformed {
            details: "workflow event has no type".to_string(),
        })?;

    let timestamp = match raw.timestamp.or(raw.created_at) {
        Some(ts) => parse_timestamp(ts)?,
        None => now,
    };

    Ok(Event {
        id: raw
            .id
            .unwrap_or_else(|| RecordId::Text(Uuid::new_v4().to_string())),
        event_type,
        client: raw.client.or(raw.client_name).unwrap_or_default(),
        status: raw.status.unwrap_or_else(|| "pending".to_string()),
        timestamp,
        description: raw.description.unwrap_or_default(),
        related_clients: raw.related_clients,
        related_tasks: raw.related_tasks,
        actionable: raw.actionable,
    })
}

/// Normalize a raw health report into a full replacement map
pub fn normalize_health(
    raw: Value,
    now: DateTime<Utc>,
) -> Result<IntegrationHealthMap, FeedError> {
    let raw: BTreeMap<String, RawHealth> =
        serde_json::from_value(raw).map_err(|e| FeedError::Malformed {
            details: format!("integration status: {}", e),
        })?;

    raw.into_iter()
        .map(|(name, health)| -> Result<(String, IntegrationHealth), FeedError> {
            let last_check_at = match health.last_check_at {
                Some(ts) => parse_timestamp(ts)?,
                None => now,
            };
            let status = health.status.unwrap_or(if health.is_healthy {
                HealthState::Healthy
            } else {
                HealthState::Error
            });

            Ok((
                name,
                IntegrationHealth {
                    is_healthy: health.is_healthy,
                    last_check_at,
                    status,
                },
            ))
        })
        .collect()
}

/// Normalize a payload of the given wire kind
pub fn normalize_message(
    kind: &str,
    raw: Value,
    now: DateTime<Utc>,
) -> Result<PushMessage, FeedError> {
    match kind {
        "workflow_event" => normalize_event(raw, now).map(PushMessage::WorkflowEvent),
        "integration_status" => normalize_health(raw, now).map(PushMessage::IntegrationStatus),
        other => Err(FeedError::Malformed {
            details: format!("unknown message kind '{}'", other),
        }),
    }
}

fn parse_timestamp(raw: RawTimestamp) -> Result<DateTime<Utc>, FeedError> {
    match raw {
        RawTimestamp::Millis(ms) => {
            Utc.timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| FeedError::Malformed {
                    details: format!("timestamp {} out of range", ms),
                })
        }
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| FeedError::Malformed {
                details: format!("timestamp '{}': {}", text, e),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_event_with_both_type_fields() {
        let raw = json!({
            "id": 1,
            "type": "call_completed",
            "event_type": "call_completed",
            "client": "Acme Corp",
            "status": "completed",
            "timestamp": "2024-01-15T11:00:00Z",
            "description": "Sales call with decision maker",
            "related_clients": ["Acme Corp", "Acme Subsidiary"],
            "related_tasks": ["Follow-up email"],
            "actionable": true
        });

        let event = normalize_event(raw, now()).unwrap();
        assert_eq!(event.id, RecordId::Number(1));
        assert_eq!(event.event_type, "call_completed");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap());
        assert_eq!(event.related_clients.len(), 2);
        assert!(event.actionable);
    }

    #[test]
    fn test_event_with_alternate_fields() {
        let raw = json!({
            "event_type": "task_created",
            "client_name": "Innovation Labs",
            "created_at": 1705320000000i64,
        });

        let event = normalize_event(raw, now()).unwrap();
        assert_eq!(event.event_type, "task_created");
        assert_eq!(event.client, "Innovation Labs");
        assert_eq!(event.status, "pending");
        assert_eq!(event.timestamp, now());
        assert!(matches!(event.id, RecordId::Text(_)));
        assert!(!event.actionable);
    }

    #[test]
    fn test_event_without_type_is_rejected() {
        let err = normalize_event(json!({"client": "Acme"}), now()).unwrap_err();
        assert!(matches!(err, FeedError::Malformed { .. }));
    }

    #[test]
    fn test_event_without_timestamp_uses_now() {
        let event = normalize_event(json!({"type": "call_scheduled"}), now()).unwrap();
        assert_eq!(event.timestamp, now());
    }

    #[test]
    fn test_health_status_derived_from_flag() {
        let raw = json!({
            "accelo": {"is_healthy": true},
            "slack": {"is_healthy": false, "last_check_at": "2024-01-15T10:00:00Z"},
            "fireflies": {"is_healthy": false, "status": "degraded"}
        });

        let health = normalize_health(raw, now()).unwrap();
        assert_eq!(health["accelo"].status, HealthState::Healthy);
        assert_eq!(health["accelo"].last_check_at, now());
        assert_eq!(health["slack"].status, HealthState::Error);
        assert_eq!(health["fireflies"].status, HealthState::Degraded);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(normalize_message("presence", json!({}), now()).is_err());
    }
}
