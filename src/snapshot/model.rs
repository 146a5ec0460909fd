use crate::events::{Event, IntegrationHealthMap, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Headline dashboard counters.
///
/// Fields the backend sends beyond the four counters are kept verbatim in
/// `extra` so nothing is lost on the way to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_clients: u64,
    pub pending_tasks: u64,
    pub completed_this_month: u64,
    pub revenue: Number,
    /// Attached from the integration health source at load time
    #[serde(default, skip_serializing_if = "IntegrationHealthMap::is_empty")]
    pub integration_health: IntegrationHealthMap,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A pending action suggested for a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecordId,
    pub recommendation_type: String,
    pub client_name: String,
    pub service_name: String,
    pub confidence: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where a snapshot section came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceProvenance {
    pub stats: Provenance,
    pub recent_events: Provenance,
    pub integration_health: Provenance,
    pub recommendations: Provenance,
}

impl SourceProvenance {
    pub fn any_mock(&self) -> bool {
        [
            self.stats,
            self.recent_events,
            self.integration_health,
            self.recommendations,
        ]
        .contains(&Provenance::Mock)
    }
}

/// Consistent point-in-time bundle shown when the dashboard opens
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub stats: DashboardStats,
    pub recent_events: Vec<Event>,
    pub recommendations: Vec<Recommendation>,
    pub sources: SourceProvenance,
    pub loaded_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn integration_health(&self) -> &IntegrationHealthMap {
        &self.stats.integration_health
    }
}
