//! Integration credential storage.
//!
//! Credentials are an opaque name to value mapping. Saving merges into the
//! existing mapping with the later value winning per key. Nothing is
//! validated, expired or encrypted.

use crate::config::{CredentialBackend, CredentialsConfig};
use crate::error::CredentialError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub type Credentials = BTreeMap<String, Value>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Merge `credentials` into the stored mapping
    async fn save(&self, credentials: Map<String, Value>) -> Result<(), CredentialError>;

    /// Full current mapping
    async fn get(&self) -> Result<Credentials, CredentialError>;

    /// Persist anything not yet written; called on shutdown
    async fn flush(&self) -> Result<(), CredentialError> {
        Ok(())
    }

    fn backend(&self) -> CredentialBackend;
}

/// Build the configured backend
pub async fn open_store(
    config: &CredentialsConfig,
) -> Result<Arc<dyn CredentialStore>, CredentialError> {
    match config.backend {
        CredentialBackend::Memory => {
            info!("Using in-memory credential store; credentials are lost on restart");
            Ok(Arc::new(MemoryCredentialStore::new()))
        }
        CredentialBackend::File => {
            let store = FileCredentialStore::open(&config.path).await?;
            info!("Using file credential store at {:?}", store.path());
            Ok(Arc::new(store))
        }
    }
}

fn merge(target: &mut Credentials, update: Map<String, Value>) {
    for (key, value) in update {
        target.insert(key, value);
    }
}

/// Process-lifetime store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, credentials: Map<String, Value>) -> Result<(), CredentialError> {
        debug!("Saving {} credential entries", credentials.len());
        merge(&mut self.credentials.write(), credentials);
        Ok(())
    }

    async fn get(&self) -> Result<Credentials, CredentialError> {
        Ok(self.credentials.read().clone())
    }

    fn backend(&self) -> CredentialBackend {
        CredentialBackend::Memory
    }
}

/// Store backed by a JSON file, read at open and rewritten on every save
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    credentials: RwLock<Credentials>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCredentialStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();

        let credentials = match tokio::fs::read(&path).await {
            Ok(contents) => {
                serde_json::from_slice(&contents).map_err(|e| CredentialError::Read {
                    path: path.display().to_string(),
                    details: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Credential file {:?} does not exist yet", path);
                Credentials::new()
            }
            Err(e) => {
                return Err(CredentialError::Read {
                    path: path.display().to_string(),
                    details: e.to_string(),
                })
            }
        };

        Ok(Self {
            path,
            credentials: RwLock::new(credentials),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self) -> Result<(), CredentialError> {
        let _guard = self.write_lock.lock().await;
        let write_error = |details: String| CredentialError::Write {
            path: self.path.display().to_string(),
            details,
        };

        let contents = {
            let credentials = self.credentials.read();
            serde_json::to_vec_pretty(&*credentials).map_err(|e| write_error(e.to_string()))?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(e.to_string()))?;
        }

        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| write_error(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save(&self, credentials: Map<String, Value>) -> Result<(), CredentialError> {
        debug!(
            "Saving {} credential entries to {:?}",
            credentials.len(),
            self.path
        );
        merge(&mut self.credentials.write(), credentials);
        self.write_file().await
    }

    async fn get(&self) -> Result<Credentials, CredentialError> {
        Ok(self.credentials.read().clone())
    }

    async fn flush(&self) -> Result<(), CredentialError> {
        self.write_file().await
    }

    fn backend(&self) -> CredentialBackend {
        CredentialBackend::File
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("Not an object: {}", other),
        }
    }

    async fn assert_merge_semantics(store: &dyn CredentialStore) {
        store.save(update(json!({"a": 1}))).await.unwrap();
        store.save(update(json!({"b": 2}))).await.unwrap();
        assert_eq!(
            serde_json::to_value(store.get().await.unwrap()).unwrap(),
            json!({"a": 1, "b": 2})
        );

        store.save(update(json!({"a": 3}))).await.unwrap();
        assert_eq!(
            serde_json::to_value(store.get().await.unwrap()).unwrap(),
            json!({"a": 3, "b": 2})
        );
    }

    #[tokio::test]
    async fn test_memory_store_merges() {
        let store = MemoryCredentialStore::new();
        assert!(store.get().await.unwrap().is_empty());
        assert_merge_semantics(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::open(&path).await.unwrap();
        assert_merge_semantics(&store).await;

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(
            serde_json::to_value(reopened.get().await.unwrap()).unwrap(),
            json!({"a": 3, "b": 2})
        );
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{not json").unwrap();

        let err = FileCredentialStore::open(file.path()).await.unwrap_err();
        assert!(matches!(err, CredentialError::Read { .. }));
    }

    #[tokio::test]
    async fn test_open_store_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CredentialsConfig {
            backend: CredentialBackend::File,
            path: dir.path().join("creds.json").to_string_lossy().to_string(),
        };

        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend(), CredentialBackend::File);

        store.save(update(json!({"slack_token": "xoxb"}))).await.unwrap();
        store.flush().await.unwrap();
        assert!(dir.path().join("creds.json").exists());

        let memory = open_store(&CredentialsConfig::default()).await.unwrap();
        assert_eq!(memory.backend(), CredentialBackend::Memory);
    }
}
