use super::dev_mode::DevMode;
use super::mock;
use super::model::{DashboardSnapshot, Provenance, SourceProvenance};
use super::source::SnapshotSource;
use crate::error::SnapshotError;
use crate::events::IntegrationHealthMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of the most recent load
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded {
        at: DateTime<Utc>,
        sources: SourceProvenance,
    },
    Failed {
        at: DateTime<Utc>,
        failures: Vec<String>,
    },
}

/// Assembles a [`DashboardSnapshot`] from four concurrent fetches
pub struct SnapshotLoader {
    source: Arc<dyn SnapshotSource>,
    dev_mode: Arc<DevMode>,
    recent_events_limit: usize,
    integrations: BTreeSet<String>,
    state: RwLock<LoadState>,
}

impl SnapshotLoader {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        dev_mode: Arc<DevMode>,
        recent_events_limit: usize,
    ) -> Self {
        Self {
            source,
            dev_mode,
            recent_events_limit,
            integrations: BTreeSet::new(),
            state: RwLock::new(LoadState::NotLoaded),
        }
    }

    /// Restrict integration health to these names; empty accepts any key
    pub fn with_integrations(mut self, integrations: impl IntoIterator<Item = String>) -> Self {
        self.integrations = integrations.into_iter().collect();
        self
    }

    pub fn dev_mode(&self) -> &Arc<DevMode> {
        &self.dev_mode
    }

    pub fn state(&self) -> LoadState {
        self.state.read().clone()
    }

    /// Fetch all four sources and wait for every one of them to settle.
    ///
    /// With development mode on, each failed source is replaced by its mock
    /// and the others are kept. With it off, any failure fails the load and
    /// the failures are recorded in [`LoadState::Failed`].
    pub async fn load(&self) -> Result<DashboardSnapshot, SnapshotError> {
        let dev_mode = self.dev_mode.is_enabled();
        *self.state.write() = LoadState::Loading;
        debug!("Loading dashboard snapshot (development mode: {})", dev_mode);

        let (stats, recent_events, integration_health, recommendations) = tokio::join!(
            self.source.stats(),
            self.source.recent_events(self.recent_events_limit),
            self.source.integration_health(),
            self.source.pending_recommendations(),
        );

        let mut failures = Vec::new();
        let stats = with_fallback(stats, dev_mode, mock::stats, &mut failures);
        let recent_events =
            with_fallback(recent_events, dev_mode, mock::recent_events, &mut failures);
        let integration_health = with_fallback(
            integration_health,
            dev_mode,
            mock::integration_health,
            &mut failures,
        );
        let recommendations = with_fallback(
            recommendations,
            dev_mode,
            mock::pending_recommendations,
            &mut failures,
        );

        let now = Utc::now();
        let (
            Some((mut stats, stats_from)),
            Some((mut recent_events, events_from)),
            Some((integration_health, health_from)),
            Some((recommendations, recommendations_from)),
        ) = (stats, recent_events, integration_health, recommendations)
        else {
            warn!("Dashboard failed to load: {}", failures.join("; "));
            *self.state.write() = LoadState::Failed {
                at: now,
                failures: failures.clone(),
            };
            return Err(SnapshotError::LoadFailed { failures });
        };

        recent_events.truncate(self.recent_events_limit);
        stats.integration_health = self.restrict_to_configured(integration_health);

        let sources = SourceProvenance {
            stats: stats_from,
            recent_events: events_from,
            integration_health: health_from,
            recommendations: recommendations_from,
        };

        if sources.any_mock() {
            info!("Dashboard loaded with mock data substituted: {:?}", sources);
        } else {
            info!("Dashboard loaded from live sources");
        }

        *self.state.write() = LoadState::Loaded { at: now, sources };

        Ok(DashboardSnapshot {
            stats,
            recent_events,
            recommendations,
            sources,
            loaded_at: now,
        })
    }
}

impl SnapshotLoader {
    fn restrict_to_configured(&self, mut health: IntegrationHealthMap) -> IntegrationHealthMap {
        if !self.integrations.is_empty() {
            health.retain(|name, _| {
                let known = self.integrations.contains(name);
                if !known {
                    debug!("Dropping snapshot health for unconfigured integration '{}'", name);
                }
                known
            });
        }
        health
    }
}

/// Settle one fetch: live value, mock substitute, or a recorded failure
fn with_fallback<T>(
    result: Result<T, SnapshotError>,
    dev_mode: bool,
    mock: fn() -> T,
    failures: &mut Vec<String>,
) -> Option<(T, Provenance)> {
    match result {
        Ok(value) => Some((value, Provenance::Live)),
        Err(e) if dev_mode => {
            warn!("Development mode: using mock data after {}", e);
            Some((mock(), Provenance::Mock))
        }
        Err(e) => {
            failures.push(e.to_string());
            None
        }
    }
}
