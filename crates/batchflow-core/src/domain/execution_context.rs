//! Checkpoint container attached to job and step executions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered key/value checkpoint state.
///
/// Equality compares contents only; the dirty flag is bookkeeping for the
/// repository and is not part of the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: BTreeMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl ExecutionContext {
    /// Empty, clean context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context holding a copy of `entries`, marked clean
    pub fn from_map(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries,
            dirty: false,
        }
    }

    /// Store a value. Storing an equal value does not mark the context dirty.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if self.entries.get(&key) != Some(&value) {
            self.entries.insert(key, value);
            self.dirty = true;
        }
    }

    /// Store a string value
    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Value::String(value.into()));
    }

    /// Store an integer value
    pub fn put_long(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, Value::from(value));
    }

    /// Raw value lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// String lookup; `None` when absent or not a string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Integer lookup; `None` when absent or not an integer
    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(Value::as_i64)
    }

    /// Integer lookup with a fallback
    pub fn get_long_or(&self, key: &str, default: i64) -> i64 {
        self.get_long(key).unwrap_or(default)
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Defensive copy of the entries
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.entries.clone()
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether anything changed since the last `clear_dirty_flag`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the context clean
    pub fn clear_dirty_flag(&mut self) {
        self.dirty = false;
    }

    /// Apply every entry of `delta` on top of this context
    pub fn merge(&mut self, delta: &ExecutionContext) {
        for (key, value) in &delta.entries {
            self.put(key.clone(), value.clone());
        }
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ExecutionContext {}

impl From<BTreeMap<String, Value>> for ExecutionContext {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::from_map(entries)
    }
}
