//! Key-value persistence contract
//!
//! The engine persists settings through an opaque put/get-by-key
//! interface; values are self-describing JSON records. Two
//! implementations ship with the crate: an in-memory store for tests and
//! a whole-file JSON store for simple hosts. Real hosts typically adapt
//! their own storage behind the trait.

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Opaque put/get by string key
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store a value
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Remove a key
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

/// Whole-file JSON store
///
/// Reads and rewrites one JSON object per operation. Fine for the small
/// settings payloads this engine persists; not a database.
pub struct JsonFileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Create a store backed by `path` (created on first write)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<HashMap<String, serde_json::Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_map(&self, map: &HashMap<String, serde_json::Value>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
