use crate::config::DevModeConfig;
use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDevMode {
    enabled: bool,
}

/// Development mode toggle shared by the loader and the HTTP surface.
///
/// The flag is persisted to a small JSON file so it survives restarts.
#[derive(Debug)]
pub struct DevMode {
    enabled: AtomicBool,
    state_file: Option<PathBuf>,
    // Serializes toggles so the file and the flag agree
    write_lock: Mutex<()>,
}

impl DevMode {
    /// Load the persisted flag, falling back to the configured initial value
    pub fn load(config: &DevModeConfig) -> Self {
        let path = config.state_path();
        let enabled = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PersistedDevMode>(&contents) {
                Ok(state) => {
                    debug!("Restored development mode {} from {:?}", state.enabled, path);
                    state.enabled
                }
                Err(e) => {
                    warn!("Ignoring unreadable development mode state {:?}: {}", path, e);
                    config.enabled
                }
            },
            Err(_) => config.enabled,
        };

        if enabled {
            info!("Development mode enabled: failed snapshot sources fall back to mock data");
        }

        Self {
            enabled: AtomicBool::new(enabled),
            state_file: Some(path),
            write_lock: Mutex::new(()),
        }
    }

    /// A toggle that is never persisted
    pub fn in_memory(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            state_file: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Persist the flag, then change it.
    ///
    /// A failed write leaves the current value in place.
    pub async fn set(&self, enabled: bool) -> Result<(), SnapshotError> {
        let _guard = self.write_lock.lock().await;

        if let Some(path) = &self.state_file {
            Self::persist(path, enabled).await?;
        }

        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("Development mode {}", if enabled { "enabled" } else { "disabled" });
        }
        Ok(())
    }

    async fn persist(path: &Path, enabled: bool) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SnapshotError::DevModePersist(e.to_string()))?;
        }

        let contents = serde_json::to_vec(&PersistedDevMode { enabled })
            .map_err(|e| SnapshotError::DevModePersist(e.to_string()))?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| SnapshotError::DevModePersist(e.to_string()))?;

        debug!("Persisted development mode to {:?}", path);
        Ok(())
    }
}
