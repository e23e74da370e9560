//! Shared Key-Value Table
//!
//! This module implements the single table every connection reads and writes.
//!
//! ## Concurrency Model
//!
//! Connections run as tokio tasks on a multi-threaded runtime, so two store
//! operations can execute truly in parallel. Every operation therefore takes
//! the table lock exactly once and does all of its work under it. Multi-key
//! operations (`mget`, `mset`, `flush`) are atomic as a whole: no other
//! connection can observe half of an `mset`.
//!
//! The lock is never held across an `.await`.

use crate::protocol::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The in-memory table shared by all connections.
///
/// # Example
///
/// ```
/// use wirekv::storage::Store;
/// use wirekv::protocol::Value;
///
/// let store = Store::new();
/// store.set("name".to_string(), Value::str("alice"));
/// assert_eq!(store.get("name"), Value::str("alice"));
/// assert_eq!(store.get("missing"), Value::Null);
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: RwLock<HashMap<String, Value>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single HashMap call, so the table behind a
    // poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value stored at `key`, or `Null` if the key is absent.
    pub fn get(&self, key: &str) -> Value {
        self.read().get(key).cloned().unwrap_or(Value::Null)
    }

    /// Stores `value` at `key`, overwriting any previous value.
    pub fn set(&self, key: String, value: Value) {
        self.write().insert(key, value);
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Removes every key and returns how many there were.
    pub fn flush(&self) -> usize {
        let mut data = self.write();
        let removed = data.len();
        data.clear();
        removed
    }

    /// Looks up several keys at once, preserving request order.
    pub fn mget<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Value> {
        let data = self.read();
        keys.iter()
            .map(|key| data.get(key.as_ref()).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Stores several pairs under one lock acquisition. Returns the number of
    /// pairs written.
    pub fn mset(&self, pairs: Vec<(String, Value)>) -> usize {
        let count = pairs.len();
        let mut data = self.write();
        data.extend(pairs);
        count
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
