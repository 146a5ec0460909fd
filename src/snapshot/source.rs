use super::model::{DashboardStats, Recommendation};
use crate::config::SnapshotConfig;
use crate::error::{SnapshotError, SnapshotSourceKind};
use crate::events::{Event, IntegrationHealthMap};
use crate::source::{normalize_event, normalize_health};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

/// The four backends the dashboard snapshot is assembled from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn stats(&self) -> Result<DashboardStats, SnapshotError>;

    /// Most recent events, newest first, at most `limit` of them
    async fn recent_events(&self, limit: usize) -> Result<Vec<Event>, SnapshotError>;

    async fn integration_health(&self) -> Result<IntegrationHealthMap, SnapshotError>;

    async fn pending_recommendations(&self) -> Result<Vec<Recommendation>, SnapshotError>;
}

/// Snapshot source backed by the CIA REST API
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
}

impl HttpSnapshotSource {
    pub fn new(config: &SnapshotConfig) -> Result<Self, SnapshotError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| SnapshotError::Request {
                source_kind: SnapshotSourceKind::Stats,
                details: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        source_kind: SnapshotSourceKind,
        path: &str,
    ) -> Result<T, SnapshotError> {
        let url = self.url(path);
        debug!("Fetching {} from {}", source_kind, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SnapshotError::Request {
                source_kind,
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status {
                source_kind,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SnapshotError::Decode {
                source_kind,
                details: e.to_string(),
            })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    #[instrument(skip(self))]
    async fn stats(&self) -> Result<DashboardStats, SnapshotError> {
        self.get_json(SnapshotSourceKind::Stats, "/api/analytics/dashboard-stats")
            .await
    }

    #[instrument(skip(self))]
    async fn recent_events(&self, limit: usize) -> Result<Vec<Event>, SnapshotError> {
        let kind = SnapshotSourceKind::RecentEvents;
        let raw: Vec<Value> = self
            .get_json(kind, &format!("/api/analytics/recent-events?limit={}", limit))
            .await?;

        let now = Utc::now();
        raw.into_iter()
            .take(limit)
            .map(|event| {
                normalize_event(event, now).map_err(|e| SnapshotError::Decode {
                    source_kind: kind,
                    details: e.to_string(),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn integration_health(&self) -> Result<IntegrationHealthMap, SnapshotError> {
        let kind = SnapshotSourceKind::IntegrationHealth;
        let raw: Value = self.get_json(kind, "/health/integrations").await?;

        normalize_health(raw, Utc::now()).map_err(|e| SnapshotError::Decode {
            source_kind: kind,
            details: e.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn pending_recommendations(&self) -> Result<Vec<Recommendation>, SnapshotError> {
        self.get_json(
            SnapshotSourceKind::Recommendations,
            "/api/recommendations?status=pending",
        )
        .await
    }
}
