//! Unified storage interface
//!
//! [`DataStorage`] is the single entry point for key-value access. It wraps
//! one [`StorageBackend`], validates values before writing them, and reports
//! activity to listeners according to its [`EmitMode`].
//!
//! ## Usage
//!
//! ```ignore
//! let storage: DataStorage<Settings> = DataStorage::new(MemoryBackend::new())?;
//!
//! storage.save("settings", &settings).await?;
//! let loaded = storage.load("settings").await?;
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{JsonFileBackend, MemoryBackend, Snapshot, StorageBackend};
use crate::config::{BackendKind, Config};
use crate::error::{StorageError, StorageResult};
use crate::events::{EmitMode, EventEmitter, EventKind, ListenerId, StorageEvent};

/// Key-value façade over a storage backend
pub struct DataStorage<T> {
    backend: Box<dyn StorageBackend>,
    events: EventEmitter,
    /// Read on every call so a change applies to the next operation
    emit_mode: RwLock<EmitMode>,
    _value: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for DataStorage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStorage")
            .field("backend", &self.backend.name())
            .field("emit_mode", &self.emit_mode())
            .field("events", &self.events)
            .finish()
    }
}

impl<T> DataStorage<T> {
    /// Wrap a backend using the default emission mode
    pub fn new(backend: impl StorageBackend + 'static) -> StorageResult<Self> {
        Self::with_emit_mode(backend, EmitMode::default())
    }

    /// Wrap a backend with an explicit emission mode
    pub fn with_emit_mode(
        backend: impl StorageBackend + 'static,
        mode: EmitMode,
    ) -> StorageResult<Self> {
        Self::from_boxed(Box::new(backend), mode)
    }

    /// Wrap an already boxed backend
    ///
    /// Fails if the backend can neither read in bulk nor list its keys,
    /// since `get_all` would have no way to answer.
    pub fn from_boxed(backend: Box<dyn StorageBackend>, mode: EmitMode) -> StorageResult<Self> {
        if backend.bulk_read().is_none() && backend.key_listing().is_none() {
            return Err(StorageError::Configuration(format!(
                "backend '{}' offers neither bulk reads nor key listing",
                backend.name()
            )));
        }

        debug!("Opened {} storage (emit mode: {})", backend.name(), mode);
        Ok(Self {
            backend,
            events: EventEmitter::new(),
            emit_mode: RwLock::new(mode),
            _value: PhantomData,
        })
    }

    /// Open storage with the backend described by the configuration
    pub fn open(config: &Config) -> StorageResult<Self> {
        let backend: Box<dyn StorageBackend> = match config.backend {
            BackendKind::Memory => Box::new(MemoryBackend::new()),
            BackendKind::File => Box::new(JsonFileBackend::new(config.data_file_path())),
        };
        Self::from_boxed(backend, config.emit_mode)
    }

    /// Name of the wrapped backend
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Current emission mode
    pub fn emit_mode(&self) -> EmitMode {
        *self
            .emit_mode
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change the emission mode for subsequent operations
    pub fn set_emit_mode(&self, mode: EmitMode) {
        *self
            .emit_mode
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = mode;
    }

    /// Listener registry
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Register a durable listener
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, callback)
    }

    /// Register a one-shot listener
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        self.events.once(kind, callback)
    }

    /// Remove a listener
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    // ==================== Raw access ====================

    /// Read the whole store through whichever capability the backend offers
    async fn snapshot(&self) -> StorageResult<Snapshot> {
        if let Some(bulk) = self.backend.bulk_read() {
            return Ok(bulk.get_all().await?);
        }

        let listing = self.backend.key_listing().ok_or_else(|| {
            StorageError::Configuration(format!(
                "backend '{}' offers neither bulk reads nor key listing",
                self.backend.name()
            ))
        })?;

        let mut snapshot = Snapshot::new();
        for key in listing.keys().await? {
            // Keys removed between listing and loading are skipped
            if let Some(value) = self.backend.load(&key).await? {
                snapshot.insert(key, value);
            }
        }
        Ok(snapshot)
    }

    /// Store an already validated JSON value and emit its event
    pub(crate) async fn save_value(&self, key: &str, value: Value) -> StorageResult<()> {
        validate_key(key)?;
        let event_value = (self.emit_mode() == EmitMode::Info).then(|| value.clone());

        self.backend.save(key, value).await?;
        debug!("Saved {}", key);

        match event_value {
            Some(value) => self.events.emit(&StorageEvent::Save {
                key: key.to_string(),
                value,
            }),
            None => self.emit_change().await,
        }
        Ok(())
    }

    /// Load the stored JSON value without converting it
    pub(crate) async fn load_value(&self, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        let Some(raw) = self.backend.load(key).await? else {
            return Ok(None);
        };

        if self.emit_mode() == EmitMode::Info {
            self.events.emit(&StorageEvent::Load {
                key: key.to_string(),
                value: raw.clone(),
            });
        }
        Ok(Some(raw))
    }

    /// Emit a full-snapshot change event, if anyone is listening
    async fn emit_change(&self) {
        if self.events.listener_count(EventKind::Change) == 0 {
            return;
        }
        match self.snapshot().await {
            Ok(snapshot) => self.events.emit(&StorageEvent::Change { snapshot }),
            Err(e) => warn!("Skipping change event, snapshot failed: {}", e),
        }
    }
}

impl<T> DataStorage<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Validate and store a value
    pub async fn save(&self, key: &str, value: &T) -> StorageResult<()> {
        validate_key(key)?;
        let value = to_storable(value)?;
        self.save_value(key, value).await
    }

    /// Load a value, `None` if the key is absent
    pub async fn load(&self, key: &str) -> StorageResult<Option<T>> {
        match self.load_value(key).await? {
            Some(raw) => from_stored(key, raw).map(Some),
            None => Ok(None),
        }
    }

    /// Remove a key
    ///
    /// In `Info` mode the previous value is read first so the event can carry
    /// it. That read is best-effort and never blocks the delete.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;

        let mode = self.emit_mode();
        let previous = if mode == EmitMode::Info
            && self.events.listener_count(EventKind::Delete) > 0
        {
            match self.backend.load(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Could not read {} before delete: {}", key, e);
                    None
                }
            }
        } else {
            None
        };

        self.backend.delete(key).await?;
        debug!("Deleted {}", key);

        match mode {
            EmitMode::Info => self.events.emit(&StorageEvent::Delete {
                key: key.to_string(),
                value: previous,
            }),
            EmitMode::All => self.emit_change().await,
        }
        Ok(())
    }

    /// Remove every key
    ///
    /// In `Info` mode the event carries the pre-clear contents. If those
    /// cannot be read the clear still happens but no event is emitted.
    pub async fn clear(&self) -> StorageResult<()> {
        let mode = self.emit_mode();
        let previous = if mode == EmitMode::Info
            && self.events.listener_count(EventKind::Clear) > 0
        {
            match self.snapshot().await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Skipping clear event, could not read store: {}", e);
                    None
                }
            }
        } else {
            Some(Snapshot::new())
        };

        self.backend.clear().await?;
        debug!("Cleared {} storage", self.backend.name());

        match (mode, previous) {
            (EmitMode::Info, Some(snapshot)) => {
                self.events.emit(&StorageEvent::Clear { snapshot })
            }
            (EmitMode::Info, None) => {}
            (EmitMode::All, _) => self.emit_change().await,
        }
        Ok(())
    }

    /// Read every stored value
    pub async fn get_all(&self) -> StorageResult<BTreeMap<String, T>> {
        self.snapshot()
            .await?
            .into_iter()
            .map(|(key, raw)| {
                let value = from_stored(&key, raw)?;
                Ok((key, value))
            })
            .collect()
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::Validation("key must not be empty".to_string()));
    }
    Ok(())
}

/// Convert a value into the storable JSON domain
///
/// `null` is rejected, which also catches non-finite floats since serde_json
/// encodes them as `null`.
fn to_storable<T: Serialize>(value: &T) -> StorageResult<Value> {
    let value = serde_json::to_value(value)
        .map_err(|e| StorageError::Validation(format!("value is not serializable: {}", e)))?;
    if value.is_null() {
        return Err(StorageError::Validation(
            "value must not be null".to_string(),
        ));
    }
    Ok(value)
}

fn from_stored<T: DeserializeOwned>(key: &str, raw: Value) -> StorageResult<T> {
    serde_json::from_value(raw).map_err(|source| StorageError::Deserialize {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyBackend;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn recorder(storage: &DataStorage<Value>, kind: EventKind) -> Arc<Mutex<Vec<StorageEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        storage.on(kind, move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();

        storage.save("k", &json!({"a": [1, 2]})).await.unwrap();
        assert_eq!(storage.load("k").await.unwrap(), Some(json!({"a": [1, 2]})));
        assert_eq!(storage.load("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_values() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Settings {
            theme: String,
            size: u32,
        }

        let storage: DataStorage<Settings> = DataStorage::new(MemoryBackend::new()).unwrap();
        let settings = Settings {
            theme: "dark".to_string(),
            size: 12,
        };

        storage.save("settings", &settings).await.unwrap();
        assert_eq!(storage.load("settings").await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_null_and_non_finite_rejected() {
        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();
        let err = storage.save("k", &Value::Null).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));

        let floats: DataStorage<f64> = DataStorage::new(MemoryBackend::new()).unwrap();
        let err = floats.save("k", &f64::NAN).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));

        let options: DataStorage<Option<String>> = DataStorage::new(MemoryBackend::new()).unwrap();
        assert!(options.save("k", &None).await.is_err());
        assert!(options.load("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_string_map_keys_rejected() {
        let storage: DataStorage<HashMap<(u8, u8), u8>> =
            DataStorage::new(MemoryBackend::new()).unwrap();
        let mut value = HashMap::new();
        value.insert((1, 2), 3);

        let err = storage.save("k", &value).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();
        assert!(matches!(
            storage.save("", &json!(1)).await,
            Err(StorageError::Validation(_))
        ));
        assert!(storage.load("").await.is_err());
    }

    #[tokio::test]
    async fn test_mismatched_shape_on_load() {
        let raw: DataStorage<Value> = DataStorage::new(MemoryBackend::with_entries([(
            "k",
            json!("not a number"),
        )]))
        .unwrap();
        assert!(raw.load("k").await.is_ok());

        let typed: DataStorage<u32> =
            DataStorage::new(MemoryBackend::with_entries([("k", json!("not a number"))]))
                .unwrap();
        assert!(matches!(
            typed.load("k").await,
            Err(StorageError::Deserialize { .. })
        ));
    }

    #[tokio::test]
    async fn test_backend_without_whole_store_read_is_rejected() {
        let backend = FlakyBackend::new().with_capabilities(false, false);
        let err = DataStorage::<Value>::new(backend).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_get_all_via_key_listing() {
        let backend = FlakyBackend::with_entries([("a", json!(1)), ("b", json!(2))])
            .with_capabilities(false, true);
        let storage: DataStorage<Value> = DataStorage::new(backend).unwrap();

        let all = storage.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], json!(1));
        assert_eq!(all["b"], json!(2));
    }

    #[tokio::test]
    async fn test_all_mode_emits_change_snapshots() {
        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();
        let changes = recorder(&storage, EventKind::Change);
        let saves = recorder(&storage, EventKind::Save);

        storage.save("a", &json!(1)).await.unwrap();
        storage.save("b", &json!(2)).await.unwrap();
        storage.load("a").await.unwrap();
        storage.delete("a").await.unwrap();
        storage.clear().await.unwrap();

        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 4);
        match &changes[1] {
            StorageEvent::Change { snapshot } => assert_eq!(snapshot.len(), 2),
            other => panic!("unexpected event {:?}", other),
        }
        match &changes[3] {
            StorageEvent::Change { snapshot } => assert!(snapshot.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_info_mode_emits_targeted_events() {
        let storage: DataStorage<Value> =
            DataStorage::with_emit_mode(MemoryBackend::new(), EmitMode::Info).unwrap();
        let saves = recorder(&storage, EventKind::Save);
        let loads = recorder(&storage, EventKind::Load);
        let deletes = recorder(&storage, EventKind::Delete);
        let clears = recorder(&storage, EventKind::Clear);
        let changes = recorder(&storage, EventKind::Change);

        storage.save("a", &json!("x")).await.unwrap();
        storage.save("b", &json!("y")).await.unwrap();
        storage.load("a").await.unwrap();
        storage.load("missing").await.unwrap();
        storage.delete("a").await.unwrap();
        storage.clear().await.unwrap();

        assert_eq!(saves.lock().unwrap().len(), 2);
        assert_eq!(
            loads.lock().unwrap().as_slice(),
            &[StorageEvent::Load {
                key: "a".to_string(),
                value: json!("x")
            }]
        );
        assert_eq!(
            deletes.lock().unwrap().as_slice(),
            &[StorageEvent::Delete {
                key: "a".to_string(),
                value: Some(json!("x"))
            }]
        );
        match &clears.lock().unwrap()[0] {
            StorageEvent::Clear { snapshot } => {
                assert_eq!(snapshot.len(), 1);
                assert_eq!(snapshot["b"], json!("y"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(changes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mode_change_applies_to_next_call() {
        let storage: DataStorage<Value> = DataStorage::new(MemoryBackend::new()).unwrap();
        let saves = recorder(&storage, EventKind::Save);

        storage.save("a", &json!(1)).await.unwrap();
        storage.set_emit_mode(EmitMode::Info);
        storage.save("b", &json!(2)).await.unwrap();

        assert_eq!(storage.emit_mode(), EmitMode::Info);
        assert_eq!(saves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_proceeds_when_pre_read_fails() {
        let backend = FlakyBackend::with_entries([("a", json!(1))]);
        let plan = backend.plan();
        let storage: DataStorage<Value> =
            DataStorage::with_emit_mode(backend, EmitMode::Info).unwrap();
        let deletes = recorder(&storage, EventKind::Delete);

        plan.fail_load("a");
        storage.delete("a").await.unwrap();
        plan.heal();

        assert_eq!(storage.load("a").await.unwrap(), None);
        assert_eq!(
            deletes.lock().unwrap().as_slice(),
            &[StorageEvent::Delete {
                key: "a".to_string(),
                value: None
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_snapshot_does_not_fail_save() {
        let backend = FlakyBackend::new();
        let plan = backend.plan();
        let storage: DataStorage<Value> = DataStorage::new(backend).unwrap();
        let changes = recorder(&storage, EventKind::Change);

        plan.fail_snapshot();
        storage.save("a", &json!(1)).await.unwrap();

        assert!(changes.lock().unwrap().is_empty());
        assert_eq!(storage.load("a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_clear_skips_event_when_snapshot_fails() {
        let backend = FlakyBackend::with_entries([("a", json!(1))]);
        let plan = backend.plan();
        let storage: DataStorage<Value> =
            DataStorage::with_emit_mode(backend, EmitMode::Info).unwrap();
        let clears = recorder(&storage, EventKind::Clear);

        plan.fail_snapshot();
        storage.clear().await.unwrap();
        plan.heal();

        assert!(clears.lock().unwrap().is_empty());
        assert!(storage.get_all().await.unwrap().is_empty());

        // An empty store still reports its (empty) contents
        storage.clear().await.unwrap();
        assert_eq!(
            clears.lock().unwrap().as_slice(),
            &[StorageEvent::Clear {
                snapshot: Snapshot::new()
            }]
        );
    }

    #[tokio::test]
    async fn test_open_with_file_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            backend: BackendKind::File,
            ..Config::default()
        };

        {
            let storage: DataStorage<Value> = DataStorage::open(&config).unwrap();
            storage.save("persisted", &json!(true)).await.unwrap();
        }

        let storage: DataStorage<Value> = DataStorage::open(&config).unwrap();
        assert_eq!(storage.backend_name(), "file");
        assert_eq!(storage.load("persisted").await.unwrap(), Some(json!(true)));
        assert!(config.data_file_path().exists());
    }
}
