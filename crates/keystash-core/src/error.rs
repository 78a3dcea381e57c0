//! Error handling
//!
//! Two layers of errors:
//! - [`BackendError`]: the storage primitive itself failed (I/O, quota, corruption)
//! - [`StorageError`]: everything the façade and the batch/transaction engine
//!   can report, wrapping backend failures

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a concrete storage backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read or write a backing file
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Backing data cannot be parsed
    #[error("Store at '{path}' is corrupted: {details}")]
    Corrupt { path: PathBuf, details: String },

    /// Value could not be encoded for the backend
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the operation (remote down, key rejected, ...)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => BackendError::DiskFull {
                path,
                source: error,
            },
            _ => BackendError::Io {
                path,
                source: error,
            },
        }
    }

    /// Check if this error is recoverable by the user
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BackendError::DiskFull { .. }
                | BackendError::PermissionDenied { .. }
                | BackendError::Unavailable(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            BackendError::DiskFull { .. } => Some("Free up disk space and try again."),
            BackendError::PermissionDenied { .. } => {
                Some("Check file and directory permissions for the data directory.")
            }
            BackendError::Corrupt { .. } => Some(
                "The store file could not be parsed. Restore it from a copy or remove it to start fresh.",
            ),
            BackendError::Unavailable(_) => Some("Retry once the backend is reachable again."),
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Errors surfaced by [`DataStorage`](crate::DataStorage) and the batch engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// Value rejected before any write was attempted
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The underlying backend failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Transaction mutated after it reached a terminal state
    #[error("Transaction {0}")]
    InvalidState(&'static str),

    /// Restoring the transaction backup failed for one or more keys
    #[error("Rollback failed for {failed} key(s): {}", details.join("; "))]
    Rollback { failed: usize, details: Vec<String> },

    /// Storage was assembled from incompatible parts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stored value does not match the façade's value type
    #[error("Stored value for '{key}' has an unexpected shape: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            StorageError::Backend(e) => e.is_recoverable(),
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Backend(e) => e.recovery_suggestion(),
            StorageError::InvalidState(_) => Some("Start a new transaction."),
            StorageError::Rollback { .. } => Some(
                "Some keys could not be restored. Inspect them manually before retrying.",
            ),
            StorageError::Configuration(_) => {
                Some("Use a backend that supports bulk reads or key listing.")
            }
            _ => None,
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
