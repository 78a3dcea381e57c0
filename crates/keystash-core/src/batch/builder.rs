//! Operation list builder

use super::Operation;

/// Accumulates operations in order without executing them
#[derive(Debug, Clone)]
pub struct BatchBuilder<T> {
    operations: Vec<Operation<T>>,
}

impl<T> Default for BatchBuilder<T> {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
        }
    }
}

impl<T: Clone> BatchBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.operations.push(Operation::save(key, value));
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.operations.push(Operation::delete(key));
        self
    }

    /// Append one save per entry, in iteration order
    pub fn save_multiple<I, K>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
    {
        self.operations
            .extend(entries.into_iter().map(|(k, v)| Operation::save(k, v)));
        self
    }

    pub fn delete_multiple<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.operations
            .extend(keys.into_iter().map(Operation::delete));
        self
    }

    /// Copy of the accumulated operations
    pub fn build(&self) -> Vec<Operation<T>> {
        self.operations.clone()
    }

    pub fn clear(&mut self) -> &mut Self {
        self.operations.clear();
        self
    }

    pub fn count(&self) -> usize {
        self.operations.len()
    }
}
