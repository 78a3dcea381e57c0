//! In-memory backend
//!
//! Ephemeral storage for tests and short-lived processes.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{BulkRead, KeyListing, Snapshot, StorageBackend};
use crate::error::BackendResult;

/// Backend keeping every value in a map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<Snapshot>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with entries
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, key: &str, value: Value) -> BackendResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> BackendResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> BackendResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    fn bulk_read(&self) -> Option<&dyn BulkRead> {
        Some(self)
    }

    fn key_listing(&self) -> Option<&dyn KeyListing> {
        Some(self)
    }
}

#[async_trait]
impl BulkRead for MemoryBackend {
    async fn get_all(&self) -> BackendResult<Snapshot> {
        Ok(self.entries.read().await.clone())
    }
}

#[async_trait]
impl KeyListing for MemoryBackend {
    async fn keys(&self) -> BackendResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
