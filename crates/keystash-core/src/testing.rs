//! Fault-injecting backend for tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{BulkRead, KeyListing, MemoryBackend, Snapshot, StorageBackend};
use crate::error::{BackendError, BackendResult};

/// Keys on which each backend call should misbehave
#[derive(Debug, Default)]
pub struct FaultPlan {
    fail_save: Mutex<HashSet<String>>,
    fail_load: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
    panic_save: Mutex<HashSet<String>>,
    fail_snapshot: Mutex<bool>,
}

impl FaultPlan {
    pub fn fail_save(&self, key: &str) {
        self.fail_save.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_load(&self, key: &str) {
        self.fail_load.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.fail_delete.lock().unwrap().insert(key.to_string());
    }

    pub fn panic_save(&self, key: &str) {
        self.panic_save.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_snapshot(&self) {
        *self.fail_snapshot.lock().unwrap() = true;
    }

    /// Stop failing on every key
    pub fn heal(&self) {
        self.fail_save.lock().unwrap().clear();
        self.fail_load.lock().unwrap().clear();
        self.fail_delete.lock().unwrap().clear();
        self.panic_save.lock().unwrap().clear();
        *self.fail_snapshot.lock().unwrap() = false;
    }

    fn check(set: &Mutex<HashSet<String>>, op: &str, key: &str) -> BackendResult<()> {
        if set.lock().unwrap().contains(key) {
            return Err(BackendError::Unavailable(format!("injected {} failure on {}", op, key)));
        }
        Ok(())
    }
}

/// In-memory backend that fails on demand
#[derive(Debug)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    plan: Arc<FaultPlan>,
    bulk: bool,
    listing: bool,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::with_entries(Vec::<(String, Value)>::new())
    }

    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: MemoryBackend::with_entries(entries),
            plan: Arc::new(FaultPlan::default()),
            bulk: true,
            listing: true,
        }
    }

    /// Restrict which whole-store capabilities are offered
    pub fn with_capabilities(mut self, bulk: bool, listing: bool) -> Self {
        self.bulk = bulk;
        self.listing = listing;
        self
    }

    /// Handle for changing faults after the backend is handed off
    pub fn plan(&self) -> Arc<FaultPlan> {
        Arc::clone(&self.plan)
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn save(&self, key: &str, value: Value) -> BackendResult<()> {
        let should_panic = self.plan.panic_save.lock().unwrap().contains(key);
        if should_panic {
            panic!("injected panic on {}", key);
        }
        FaultPlan::check(&self.plan.fail_save, "save", key)?;
        self.inner.save(key, value).await
    }

    async fn load(&self, key: &str) -> BackendResult<Option<Value>> {
        FaultPlan::check(&self.plan.fail_load, "load", key)?;
        self.inner.load(key).await
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        FaultPlan::check(&self.plan.fail_delete, "delete", key)?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.inner.clear().await
    }

    fn bulk_read(&self) -> Option<&dyn BulkRead> {
        if self.bulk {
            Some(self)
        } else {
            None
        }
    }

    fn key_listing(&self) -> Option<&dyn KeyListing> {
        if self.listing {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl BulkRead for FlakyBackend {
    async fn get_all(&self) -> BackendResult<Snapshot> {
        if *self.plan.fail_snapshot.lock().unwrap() {
            return Err(BackendError::Unavailable("injected snapshot failure".to_string()));
        }
        self.inner.get_all().await
    }
}

#[async_trait]
impl KeyListing for FlakyBackend {
    async fn keys(&self) -> BackendResult<Vec<String>> {
        self.inner.keys().await
    }
}
