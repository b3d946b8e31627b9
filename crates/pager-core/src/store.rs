//! The latest-message slot and its key-value collaborators.
//!
//! [`MessageStore`] holds a single value under a fixed key. Durability is
//! delegated to a [`KeyValueStore`]: an in-memory map for tests and
//! ephemeral deployments, or a JSON file on disk.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};

/// Key under which the latest message is stored.
pub const LATEST_MESSAGE_KEY: &str = "latest-message";

/// Store collaborator errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is unreachable or refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// I/O error from a file-backed store.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be parsed.
    #[error("Storage data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Get/set capability required from the durable store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the value stored under `key`.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Key-value store persisted as a JSON object in a single file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by the file at `path`.
    ///
    /// The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut data = match self.load().await {
            Ok(data) => data,
            Err(StoreError::Corrupt(e)) => {
                warn!(path = %self.path.display(), error = %e, "Overwriting corrupt store file");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        data.insert(key.to_string(), value.to_string());

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&data)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        trace!(path = %self.path.display(), key = %key, "Persisted item");
        Ok(())
    }
}

/// The single latest-message slot.
///
/// `set` overwrites unconditionally; concurrent writers race and the last
/// one wins. Errors from the backend propagate unchanged.
#[derive(Clone)]
pub struct MessageStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl MessageStore {
    /// Create a slot stored under [`LATEST_MESSAGE_KEY`].
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(backend, LATEST_MESSAGE_KEY)
    }

    /// Create a slot stored under a custom key.
    #[must_use]
    pub fn with_key(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Create a slot backed by a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The key this slot is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the latest message.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get(&self) -> Result<Option<String>, StoreError> {
        self.backend.get_item(&self.key).await
    }

    /// Overwrite the latest message.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn set(&self, value: &str) -> Result<(), StoreError> {
        self.backend.set_item(&self.key, value).await?;
        debug!(key = %self.key, "Latest message updated");
        Ok(())
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("pager-{}-{}-{}.json", name, std::process::id(), nanos))
    }

    #[tokio::test]
    async fn test_slot_starts_empty() {
        let store = MessageStore::in_memory();
        assert_eq!(store.get().await.unwrap(), None);
        assert_eq!(store.key(), LATEST_MESSAGE_KEY);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = MessageStore::in_memory();
        store.set("first").await.unwrap();
        store.set("second").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let path = temp_path("persist");

        let store = MessageStore::new(Arc::new(FileStore::new(&path)));
        assert_eq!(store.get().await.unwrap(), None);
        store.set("Hello").await.unwrap();

        let reopened = MessageStore::new(Arc::new(FileStore::new(&path)));
        assert_eq!(reopened.get().await.unwrap().as_deref(), Some("Hello"));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_keeps_other_keys() {
        let path = temp_path("keys");
        let backend = FileStore::new(&path);

        backend.set_item("a", "1").await.unwrap();
        backend.set_item("b", "2").await.unwrap();
        assert_eq!(backend.get_item("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(backend.get_item("b").await.unwrap().as_deref(), Some("2"));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_recovers_from_corrupt_data() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = MessageStore::new(Arc::new(FileStore::new(&path)));
        assert!(matches!(store.get().await, Err(StoreError::Corrupt(_))));

        store.set("Recovered").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("Recovered"));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
