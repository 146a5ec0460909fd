//! Fixed fallback data used in development mode.
//!
//! Everything here is literal, including timestamps, so repeated failures
//! always produce the same dashboard.

use super::model::{DashboardStats, Recommendation};
use crate::events::{Event, HealthState, IntegrationHealth, IntegrationHealthMap, RecordId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Number};

/// Reference instant all mock timestamps are derived from
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

fn hours_ago(hours: i64) -> DateTime<Utc> {
    reference_time() - Duration::hours(hours)
}

pub fn stats() -> DashboardStats {
    DashboardStats {
        active_clients: 12,
        pending_tasks: 8,
        completed_this_month: 34,
        revenue: Number::from(125_000u64),
        integration_health: IntegrationHealthMap::new(),
        extra: Map::new(),
    }
}

pub fn recent_events() -> Vec<Event> {
    [
        (
            1,
            "call_completed",
            "Acme Corp",
            "completed",
            0,
            "Sales call with decision maker",
        ),
        (
            2,
            "recommendation_generated",
            "TechStart Inc",
            "pending",
            1,
            "AI recommended follow-up strategy",
        ),
        (
            3,
            "task_completed",
            "Global Solutions",
            "completed",
            2,
            "Contract review completed",
        ),
        (
            4,
            "integration_sync",
            "Fireflies",
            "completed",
            3,
            "Meeting transcripts synced",
        ),
        (
            5,
            "call_completed",
            "Enterprise Co",
            "completed",
            4,
            "Product demo call",
        ),
    ]
    .into_iter()
    .map(|(id, event_type, client, status, age, description)| Event {
        id: RecordId::Number(id),
        event_type: event_type.to_string(),
        client: client.to_string(),
        status: status.to_string(),
        timestamp: hours_ago(age),
        description: description.to_string(),
        related_clients: Vec::new(),
        related_tasks: Vec::new(),
        actionable: false,
    })
    .collect()
}

pub fn integration_health() -> IntegrationHealthMap {
    [
        ("accelo", true, HealthState::Healthy),
        ("fireflies", true, HealthState::Healthy),
        ("google_analytics", true, HealthState::Healthy),
        ("slack", false, HealthState::Error),
    ]
    .into_iter()
    .map(|(name, is_healthy, status)| {
        (
            name.to_string(),
            IntegrationHealth {
                is_healthy,
                last_check_at: reference_time(),
                status,
            },
        )
    })
    .collect()
}

pub fn pending_recommendations() -> Vec<Recommendation> {
    [
        (1, "follow_up", "Acme Corporation", "Send personalized proposal", 0.92, 0),
        (2, "upsell", "TechStart Inc", "Premium support package", 0.88, 1),
        (3, "engagement", "Global Solutions Ltd", "Schedule quarterly review", 0.85, 2),
        (4, "retention", "Enterprise Co", "Offer renewal incentive", 0.91, 3),
        (5, "cross_sell", "Innovation Labs", "AI Analytics module", 0.87, 4),
        (6, "follow_up", "Dynamic Corp", "Post-demo consultation", 0.89, 5),
    ]
    .into_iter()
    .map(
        |(id, recommendation_type, client_name, service_name, confidence, age)| Recommendation {
            id: RecordId::Number(id),
            recommendation_type: recommendation_type.to_string(),
            client_name: client_name.to_string(),
            service_name: service_name.to_string(),
            confidence,
            status: "pending".to_string(),
            created_at: hours_ago(age),
            extra: Map::new(),
        },
    )
    .collect()
}
