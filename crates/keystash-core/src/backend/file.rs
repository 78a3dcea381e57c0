//! JSON file backend
//!
//! Keeps the whole store as one JSON object on disk. The file is read once,
//! cached, and rewritten after every mutation using atomic writes (write to
//! temp file, then rename) to prevent corruption.
//!
//! A missing file is an empty store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BulkRead, KeyListing, Snapshot, StorageBackend};
use crate::error::{BackendError, BackendResult};

/// Backend persisting a JSON object to a single file
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    /// Contents as last read from or written to disk
    cache: Mutex<Option<Snapshot>>,
}

impl JsonFileBackend {
    /// Create a backend for the given file. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> BackendResult<Snapshot> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {:?} does not exist, starting empty", self.path);
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(BackendError::from_io(e, self.path.clone())),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| BackendError::Corrupt {
            path: self.path.clone(),
            details: e.to_string(),
        })
    }

    /// Apply a mutation to a copy of the contents, persist it, then swap it in
    ///
    /// The cache only changes once the file write succeeded, so a failed
    /// write leaves memory and disk in agreement.
    async fn mutate<F>(&self, apply: F) -> BackendResult<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut cache = self.cache.lock().await;
        let mut next = match cache.as_ref() {
            Some(current) => current.clone(),
            None => self.read_file().await?,
        };

        apply(&mut next);

        let bytes = serde_json::to_vec_pretty(&next)?;
        atomic_write(&self.path, &bytes).await?;
        *cache = Some(next);
        Ok(())
    }

    async fn snapshot(&self) -> BackendResult<Snapshot> {
        let mut cache = self.cache.lock().await;
        if let Some(current) = cache.as_ref() {
            return Ok(current.clone());
        }

        let loaded = self.read_file().await?;
        *cache = Some(loaded.clone());
        Ok(loaded)
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, key: &str, value: Value) -> BackendResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
        .await
    }

    async fn load(&self, key: &str) -> BackendResult<Option<Value>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
        .await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.mutate(Snapshot::clear).await
    }

    fn bulk_read(&self) -> Option<&dyn BulkRead> {
        Some(self)
    }

    fn key_listing(&self) -> Option<&dyn KeyListing> {
        Some(self)
    }
}

#[async_trait]
impl BulkRead for JsonFileBackend {
    async fn get_all(&self) -> BackendResult<Snapshot> {
        self.snapshot().await
    }
}

#[async_trait]
impl KeyListing for JsonFileBackend {
    async fn keys(&self) -> BackendResult<Vec<String>> {
        Ok(self.snapshot().await?.into_keys().collect())
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
async fn atomic_write(path: &Path, data: &[u8]) -> BackendResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::from_io(e, parent.to_path_buf()))?;
        }
    }

    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| BackendError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .await
        .map_err(|e| BackendError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .await
        .map_err(|e| BackendError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| BackendError::from_io(e, path.to_path_buf()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp_dir.path().join("store.json"));

        assert_eq!(backend.load("anything").await.unwrap(), None);
        assert!(backend.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");

        let backend = JsonFileBackend::new(&path);
        backend.save("name", json!("keystash")).await.unwrap();
        backend.save("count", json!(3)).await.unwrap();
        backend.delete("count").await.unwrap();

        let reopened = JsonFileBackend::new(&path);
        assert_eq!(reopened.load("name").await.unwrap(), Some(json!("keystash")));
        assert_eq!(reopened.load("count").await.unwrap(), None);
        assert_eq!(reopened.keys().await.unwrap(), vec!["name".to_string()]);
    }

    #[tokio::test]
    async fn test_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("store.json");

        let backend = JsonFileBackend::new(&path);
        backend.save("k", json!({"nested": [1, 2]})).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let backend = JsonFileBackend::new(&path);
        let err = backend.load("k").await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_clear_empties_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");

        let backend = JsonFileBackend::new(&path);
        backend.save("k", json!(1)).await.unwrap();
        backend.clear().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Snapshot = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }
}
