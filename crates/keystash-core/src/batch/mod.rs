//! Batched writes and compensating transactions
//!
//! Backends have no native multi-key transaction. This module layers two
//! things on top of [`DataStorage`](crate::DataStorage):
//!
//! - [`BatchProcessor`]: runs an ordered list of operations in bounded chunks,
//!   keeps going past individual failures and reports one
//!   [`OperationResult`] per input operation
//! - [`TransactionProcessor`]: snapshots every touched key before running a
//!   batch and writes the snapshot back if the batch did not fully succeed
//!
//! [`BatchBuilder`] assembles operation lists without touching storage.
//!
//! ## Limitations
//!
//! Rollback restores the values captured before the batch ran. A concurrent
//! writer touching the same keys in between will have its writes overwritten;
//! a `DataStorage` assumes a single logical writer.

mod builder;
mod operation;
mod processor;
mod transaction;

pub use builder::BatchBuilder;
pub use operation::{BatchResult, Operation, OperationKind, OperationResult};
pub use processor::{BatchOptions, BatchProcessor};
pub use transaction::{BackupEntry, TransactionProcessor, TransactionState};
