//! Storage lifecycle events
//!
//! [`DataStorage`](crate::DataStorage) reports its activity on five named
//! channels. What gets emitted depends on the [`EmitMode`]:
//!
//! - `All`: every mutation emits one [`StorageEvent::Change`] carrying the
//!   full post-operation snapshot
//! - `Info`: each operation emits its own targeted event
//!   (`Save`, `Load`, `Delete`, `Clear`)

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Snapshot;

/// Event emission policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitMode {
    /// Coarse full-snapshot `change` events
    #[default]
    All,
    /// Fine-grained per-operation events
    Info,
}

impl fmt::Display for EmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitMode::All => write!(f, "all"),
            EmitMode::Info => write!(f, "info"),
        }
    }
}

impl FromStr for EmitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(EmitMode::All),
            "info" => Ok(EmitMode::Info),
            other => Err(format!("unknown emit mode '{}' (expected 'all' or 'info')", other)),
        }
    }
}

/// Event channel names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Change,
    Save,
    Load,
    Delete,
    Clear,
}

/// Payload delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StorageEvent {
    /// Whole store after a mutation
    Change { snapshot: Snapshot },
    /// A value was written
    Save { key: String, value: Value },
    /// A value was found by `load`
    Load { key: String, value: Value },
    /// A key was removed, with its value beforehand when it could be read
    Delete { key: String, value: Option<Value> },
    /// The store was emptied, with its contents beforehand
    Clear { snapshot: Snapshot },
}

impl StorageEvent {
    /// Channel this event is delivered on
    pub fn kind(&self) -> EventKind {
        match self {
            StorageEvent::Change { .. } => EventKind::Change,
            StorageEvent::Save { .. } => EventKind::Save,
            StorageEvent::Load { .. } => EventKind::Load,
            StorageEvent::Delete { .. } => EventKind::Delete,
            StorageEvent::Clear { .. } => EventKind::Clear,
        }
    }
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener callback
pub type Callback = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    callback: Callback,
}

/// Registry of listeners keyed by channel
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.lock().len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a durable listener
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(callback))
    }

    /// Register a listener that is removed after its first delivery
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(callback))
    }

    /// Remove a listener. Returns `false` if it was not registered on `kind`.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !(l.id == id && l.kind == kind));
        listeners.len() != before
    }

    /// Remove every listener on a channel
    pub fn remove_all(&self, kind: EventKind) {
        self.lock().retain(|l| l.kind != kind);
    }

    /// Number of listeners on a channel
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().iter().filter(|l| l.kind == kind).count()
    }

    /// Deliver an event to every listener on its channel
    ///
    /// Callbacks run after the registry lock is released, so a listener may
    /// register or remove listeners itself.
    pub fn emit(&self, event: &StorageEvent) {
        let kind = event.kind();
        let callbacks: Vec<Callback> = {
            let mut listeners = self.lock();
            let matched = listeners
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| Arc::clone(&l.callback))
                .collect();
            listeners.retain(|l| !(l.once && l.kind == kind));
            matched
        };

        for callback in callbacks {
            callback(event);
        }
    }

    fn register(&self, kind: EventKind, once: bool, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Listener {
            id,
            kind,
            once,
            callback,
        });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        // A panicking listener never runs under this lock
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
