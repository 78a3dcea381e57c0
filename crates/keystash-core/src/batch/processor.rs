//! Chunked batch execution
//!
//! ## Algorithm
//!
//! 1. Split the operations into consecutive chunks of at most
//!    `max_batch_size`, keeping input order
//! 2. Within a chunk run every save, then every delete
//! 3. A failing operation is recorded and the chunk carries on
//! 4. A panic escaping the storage layer aborts the rest of its chunk only
//! 5. Pause `delay_between_batches` between chunks
//!
//! Results are reassembled by input position, so callers always see them in
//! the order they submitted the operations.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{BatchBuilder, BatchResult, Operation, OperationKind, OperationResult};
use crate::store::DataStorage;

/// Chunking and pacing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Operations per chunk. Zero is treated as one.
    pub max_batch_size: usize,
    /// Pause between consecutive chunks
    pub delay_between_batches: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: Self::DEFAULT_MAX_BATCH_SIZE,
            delay_between_batches: Duration::ZERO,
        }
    }
}

impl BatchOptions {
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn delay_between_batches(mut self, delay: Duration) -> Self {
        self.delay_between_batches = delay;
        self
    }

    fn chunk_size(&self) -> usize {
        self.max_batch_size.max(1)
    }
}

/// What one chunk contributed to the batch
struct ChunkOutcome<T> {
    success: bool,
    results: Vec<OperationResult<T>>,
    errors: Vec<String>,
}

/// Executes operation lists against a [`DataStorage`]
#[derive(Debug)]
pub struct BatchProcessor<'a, T> {
    storage: &'a DataStorage<T>,
    options: BatchOptions,
}

impl<'a, T> BatchProcessor<'a, T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(storage: &'a DataStorage<T>) -> Self {
        Self::with_options(storage, BatchOptions::default())
    }

    pub fn with_options(storage: &'a DataStorage<T>, options: BatchOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run every operation, reporting one result per operation in input order
    ///
    /// Never fails as a whole: partial failure is reported through
    /// `BatchResult::success` and `BatchResult::errors`.
    pub async fn execute_batch(&self, operations: Vec<Operation<T>>) -> BatchResult<T> {
        let total = operations.len();
        let chunk_size = self.options.chunk_size();
        info!(
            "Executing batch of {} operation(s) in chunks of {}",
            total, chunk_size
        );

        let mut result = BatchResult {
            success: true,
            operations: Vec::with_capacity(total),
            errors: Vec::new(),
        };

        let mut remaining = operations.into_iter().peekable();
        let mut chunk_number = 0;
        while remaining.peek().is_some() {
            chunk_number += 1;
            let chunk: Vec<Operation<T>> = remaining.by_ref().take(chunk_size).collect();

            let outcome = self.execute_chunk(chunk_number, chunk).await;
            result.success &= outcome.success;
            result.operations.extend(outcome.results);
            result.errors.extend(outcome.errors);

            if remaining.peek().is_some() {
                self.pause().await;
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            result.succeeded(),
            result.failed()
        );
        result
    }

    /// Save every entry as one batch
    pub async fn batch_save<I, K>(&self, entries: I) -> BatchResult<T>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
    {
        let mut builder = BatchBuilder::new();
        builder.save_multiple(entries);
        self.execute_batch(builder.build()).await
    }

    /// Delete every key as one batch
    pub async fn batch_delete<I, K>(&self, keys: I) -> BatchResult<T>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut builder = BatchBuilder::new();
        builder.delete_multiple(keys);
        self.execute_batch(builder.build()).await
    }

    /// Load many keys, concurrently within each chunk
    ///
    /// Every requested key appears in the result exactly once. A key whose
    /// load fails maps to `None` just like a missing key.
    pub async fn batch_load<I, K>(&self, keys: I) -> HashMap<String, Option<T>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let mut values = HashMap::with_capacity(keys.len());

        let mut chunks = keys.chunks(self.options.chunk_size()).peekable();
        while let Some(chunk) = chunks.next() {
            let loads = chunk.iter().map(|key| async move {
                let value = match self.storage.load(key).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Batch load of {} failed: {}", key, e);
                        None
                    }
                };
                (key.clone(), value)
            });

            values.extend(join_all(loads).await);

            if chunks.peek().is_some() {
                self.pause().await;
            }
        }

        values
    }

    async fn execute_chunk(&self, number: usize, chunk: Vec<Operation<T>>) -> ChunkOutcome<T> {
        debug!("Running chunk {} ({} operation(s))", number, chunk.len());

        let mut slots: Vec<Option<OperationResult<T>>> = chunk.iter().map(|_| None).collect();
        let mut errors = Vec::new();

        let run = AssertUnwindSafe(self.run_chunk(&chunk, &mut slots, &mut errors))
            .catch_unwind()
            .await;

        let summary = match run {
            Ok(()) => None,
            Err(panic) => {
                let summary = format!("Batch {} failed: {}", number, panic_message(&*panic));
                warn!("{}", summary);
                errors.push(summary.clone());
                Some(summary)
            }
        };

        let results: Vec<OperationResult<T>> = slots
            .into_iter()
            .zip(chunk)
            .map(|(slot, operation)| match (slot, &summary) {
                (Some(result), _) => result,
                (None, Some(summary)) => OperationResult::failed(operation, summary.clone()),
                (None, None) => OperationResult::failed(operation, "operation was not executed"),
            })
            .collect();

        ChunkOutcome {
            success: summary.is_none() && results.iter().all(|r| r.success),
            results,
            errors,
        }
    }

    /// Saves first, then deletes, each result written to its input slot
    async fn run_chunk(
        &self,
        chunk: &[Operation<T>],
        slots: &mut [Option<OperationResult<T>>],
        errors: &mut Vec<String>,
    ) {
        let ordered = chunk
            .iter()
            .enumerate()
            .filter(|(_, op)| op.kind() == OperationKind::Save)
            .chain(
                chunk
                    .iter()
                    .enumerate()
                    .filter(|(_, op)| op.kind() == OperationKind::Delete),
            );

        for (index, operation) in ordered {
            let outcome = match operation {
                Operation::Save { key, value } => self.storage.save(key, value).await,
                Operation::Delete { key } => self.storage.delete(key).await,
            };

            slots[index] = Some(match outcome {
                Ok(()) => OperationResult::succeeded(operation.clone()),
                Err(e) => {
                    let message = format!(
                        "Failed to {} {}: {}",
                        operation.kind(),
                        operation.key(),
                        e
                    );
                    warn!("{}", message);
                    errors.push(message);
                    OperationResult::failed(operation.clone(), e.to_string())
                }
            });
        }
    }

    async fn pause(&self) {
        let delay = self.options.delay_between_batches;
        if !delay.is_zero() {
            debug!("Pausing {:?} before next chunk", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
