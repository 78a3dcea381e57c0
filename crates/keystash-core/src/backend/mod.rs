//! Storage backends
//!
//! A backend is the concrete storage primitive behind [`DataStorage`](crate::DataStorage).
//! It stores JSON values under string keys and knows nothing about events,
//! validation or batching.
//!
//! ## Capabilities
//!
//! Every backend implements [`StorageBackend`]. Whole-store reads are optional
//! and discovered through accessor methods rather than at call time:
//!
//! - [`BulkRead`]: the backend can return its full contents in one call
//! - [`KeyListing`]: the backend can enumerate its keys, and the façade loads
//!   each one to build a snapshot
//!
//! A backend offering neither cannot back a `DataStorage`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendResult;

mod file;
mod memory;

pub use file::JsonFileBackend;
pub use memory::MemoryBackend;

/// Full contents of a store, ordered by key
pub type Snapshot = BTreeMap<String, Value>;

/// Keyed storage of JSON values
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Store a value, overwriting any previous one
    async fn save(&self, key: &str, value: Value) -> BackendResult<()>;

    /// Load a value, `None` if the key is absent
    async fn load(&self, key: &str) -> BackendResult<Option<Value>>;

    /// Remove a key. Removing an absent key is a no-op.
    async fn delete(&self, key: &str) -> BackendResult<()>;

    /// Remove every key
    async fn clear(&self) -> BackendResult<()>;

    /// Native bulk read, if offered
    fn bulk_read(&self) -> Option<&dyn BulkRead> {
        None
    }

    /// Key enumeration, if offered
    fn key_listing(&self) -> Option<&dyn KeyListing> {
        None
    }
}

/// Backend capability: read the whole store at once
#[async_trait]
pub trait BulkRead: Send + Sync {
    async fn get_all(&self) -> BackendResult<Snapshot>;
}

/// Backend capability: enumerate stored keys
#[async_trait]
pub trait KeyListing: Send + Sync {
    async fn keys(&self) -> BackendResult<Vec<String>>;
}
