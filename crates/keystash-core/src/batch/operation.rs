//! Operation and result types shared by the batch engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Save,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Save => write!(f, "save"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A single write in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation<T> {
    Save { key: String, value: T },
    Delete { key: String },
}

impl<T> Operation<T> {
    pub fn save(key: impl Into<String>, value: T) -> Self {
        Operation::Save {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Operation::Delete { key: key.into() }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Save { .. } => OperationKind::Save,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Operation::Save { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// Outcome of one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult<T> {
    pub operation: Operation<T>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn succeeded(operation: Operation<T>) -> Self {
        Self {
            operation,
            success: true,
            error: None,
        }
    }

    pub fn failed(operation: Operation<T>, error: impl Into<String>) -> Self {
        Self {
            operation,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a whole batch
///
/// `operations` holds exactly one entry per input operation, in input order.
/// `errors` summarizes every failed operation plus every aborted chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult<T> {
    pub success: bool,
    pub operations: Vec<OperationResult<T>>,
    pub errors: Vec<String>,
}

impl<T> BatchResult<T> {
    /// A successful batch with nothing in it
    pub fn empty() -> Self {
        Self {
            success: true,
            operations: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Number of operations that succeeded
    pub fn succeeded(&self) -> usize {
        self.operations.iter().filter(|r| r.success).count()
    }

    /// Number of operations that failed
    pub fn failed(&self) -> usize {
        self.operations.len() - self.succeeded()
    }
}
