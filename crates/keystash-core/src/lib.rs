//! Keystash Core Library
//!
//! Typed key-value persistence over pluggable backends, with change
//! notifications, chunked batch writes and compensating transactions.
//!
//! # Quick Start
//!
//! ```text
//! let storage: DataStorage<Settings> = DataStorage::new(MemoryBackend::new())?;
//! storage.save("settings", &settings).await?;
//!
//! let mut tx = TransactionProcessor::new(&storage);
//! tx.save("a", a)?.delete("b")?;
//! let result = tx.commit().await?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `backend`: Backend trait and the in-memory and JSON file backends
//! - `events`: Listener registry and emitted events
//! - `batch`: Batch execution, builder and transactions
//! - `config`: Application configuration
//! - `error`: Error types

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod store;

#[cfg(test)]
mod testing;

pub use backend::{BulkRead, JsonFileBackend, KeyListing, MemoryBackend, Snapshot, StorageBackend};
pub use batch::{
    BackupEntry, BatchBuilder, BatchOptions, BatchProcessor, BatchResult, Operation,
    OperationKind, OperationResult, TransactionProcessor, TransactionState,
};
pub use config::{BackendKind, Config};
pub use error::{BackendError, BackendResult, StorageError, StorageResult};
pub use events::{EmitMode, EventEmitter, EventKind, ListenerId, StorageEvent};
pub use store::DataStorage;
