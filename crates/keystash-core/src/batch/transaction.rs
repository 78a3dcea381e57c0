//! Compensating transactions
//!
//! A [`TransactionProcessor`] collects operations while `Open`. On commit it
//! records the pre-transaction value of every key the operations touch, runs
//! them as one batch, and writes the recorded values back if any operation
//! failed.
//!
//! ```text
//! Open --save/delete--> Open
//! Open --commit--> Committed          (batch fully succeeded)
//! Open --commit--> RolledBack         (batch partially failed)
//! Open --rollback--> RolledBack
//! ```
//!
//! Both terminal states reject further use.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BatchOptions, BatchProcessor, BatchResult, Operation};
use crate::error::{StorageError, StorageResult};
use crate::store::DataStorage;

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// Value of a key before the transaction touched it
///
/// Kept as stored JSON so restoring never depends on the value converting
/// back into the façade's type.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupEntry {
    Present(Value),
    Absent,
}

/// All-or-nothing wrapper around [`BatchProcessor`]
#[derive(Debug)]
pub struct TransactionProcessor<'a, T> {
    id: Uuid,
    storage: &'a DataStorage<T>,
    options: BatchOptions,
    state: TransactionState,
    operations: Vec<Operation<T>>,
    /// First-touch order
    backup: Vec<(String, BackupEntry)>,
    backed_up: HashSet<String>,
}

impl<'a, T> TransactionProcessor<'a, T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(storage: &'a DataStorage<T>) -> Self {
        Self::with_options(storage, BatchOptions::default())
    }

    pub fn with_options(storage: &'a DataStorage<T>, options: BatchOptions) -> Self {
        let id = Uuid::new_v4();
        debug!("Transaction {} opened", id);
        Self {
            id,
            storage,
            options,
            state: TransactionState::Open,
            operations: Vec::new(),
            backup: Vec::new(),
            backed_up: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Operations queued for the next commit
    pub fn pending(&self) -> &[Operation<T>] {
        &self.operations
    }

    /// Recorded pre-transaction values, in the order keys were first touched
    pub fn backup(&self) -> &[(String, BackupEntry)] {
        &self.backup
    }

    /// Queue a save
    pub fn save(&mut self, key: impl Into<String>, value: T) -> StorageResult<&mut Self> {
        self.ensure_open()?;
        self.operations.push(Operation::save(key, value));
        Ok(self)
    }

    /// Queue a delete
    pub fn delete(&mut self, key: impl Into<String>) -> StorageResult<&mut Self> {
        self.ensure_open()?;
        self.operations.push(Operation::delete(key));
        Ok(self)
    }

    /// Run the queued operations, undoing them all if any one fails
    ///
    /// A partially failed batch is returned as `Ok` with `success == false`
    /// after the touched keys were restored. An error means the restore
    /// itself failed.
    pub async fn commit(&mut self) -> StorageResult<BatchResult<T>> {
        self.ensure_open()?;
        let operations = std::mem::take(&mut self.operations);

        if operations.is_empty() {
            self.state = TransactionState::Committed;
            debug!("Transaction {} committed with no operations", self.id);
            return Ok(BatchResult::empty());
        }

        self.capture_backup(&operations).await;

        info!(
            "Transaction {} committing {} operation(s)",
            self.id,
            operations.len()
        );
        let result = BatchProcessor::with_options(self.storage, self.options)
            .execute_batch(operations)
            .await;

        if result.success {
            self.state = TransactionState::Committed;
            self.backup.clear();
            self.backed_up.clear();
            info!("Transaction {} committed", self.id);
            return Ok(result);
        }

        warn!(
            "Transaction {} failed ({} error(s)), rolling back",
            self.id,
            result.errors.len()
        );
        self.restore_backup().await?;
        Ok(result)
    }

    /// Abandon the transaction, restoring any values already captured
    pub async fn rollback(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        self.operations.clear();
        self.restore_backup().await
    }

    fn ensure_open(&self) -> StorageResult<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Committed => Err(StorageError::InvalidState("already committed")),
            TransactionState::RolledBack => Err(StorageError::InvalidState("rolled back")),
        }
    }

    /// Record each key's current value the first time any operation names it
    async fn capture_backup(&mut self, operations: &[Operation<T>]) {
        for operation in operations {
            let key = operation.key();
            if self.backed_up.contains(key) {
                continue;
            }

            // A failed read cannot be told apart from a missing key here
            let entry = match self.storage.load_value(key).await {
                Ok(Some(value)) => BackupEntry::Present(value),
                Ok(None) => BackupEntry::Absent,
                // No write can reach an invalid key, so there is nothing to restore
                Err(StorageError::Validation(reason)) => {
                    debug!(
                        "Transaction {}: not backing up invalid key {:?}: {}",
                        self.id, key, reason
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Transaction {}: could not back up {}, treating as absent: {}",
                        self.id, key, e
                    );
                    BackupEntry::Absent
                }
            };

            self.backed_up.insert(key.to_string());
            self.backup.push((key.to_string(), entry));
        }
        debug!(
            "Transaction {} backed up {} key(s)",
            self.id,
            self.backup.len()
        );
    }

    /// Replay the backup, attempting every key before reporting failures
    async fn restore_backup(&mut self) -> StorageResult<()> {
        self.state = TransactionState::RolledBack;
        let backup = std::mem::take(&mut self.backup);
        self.backed_up.clear();

        let mut details = Vec::new();
        for (key, entry) in backup {
            let outcome = match entry {
                BackupEntry::Present(value) => self.storage.save_value(&key, value).await,
                BackupEntry::Absent => self.storage.delete(&key).await,
            };

            if let Err(e) = outcome {
                warn!("Transaction {}: could not restore {}: {}", self.id, key, e);
                details.push(format!("{}: {}", key, e));
            }
        }

        if details.is_empty() {
            info!("Transaction {} rolled back", self.id);
            Ok(())
        } else {
            Err(StorageError::Rollback {
                failed: details.len(),
                details,
            })
        }
    }
}
