//! Keyed payload carried from a trigger or job definition to the running job.
//!
//! Values are stored as JSON so the job store can persist them without
//! knowing their concrete types. Mutations flip a dirty flag; the execution
//! layer uses it to detect mid-execution writes, which are never
//! re-persisted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised when placing values into a [`JobDataMap`].
#[derive(Debug, Error)]
pub enum DataMapError {
    /// The value could not be converted to JSON.
    #[error("serialization error for key '{key}': {message}")]
    Serialization { key: String, message: String },
}

/// String-keyed payload handed to jobs at execution time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDataMap {
    entries: HashMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

// equality is over the entries; the dirty flag is bookkeeping
impl PartialEq for JobDataMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl JobDataMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value that converts directly into JSON.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
        self.dirty = true;
    }

    /// Insert any serializable value.
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), DataMapError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| DataMapError::Serialization {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.entries.insert(key, value);
        self.dirty = true;
        Ok(())
    }

    /// Get a typed value. Returns `None` if the key is absent or the value
    /// does not deserialize to `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value for a key.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Remove a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the map has been mutated since the flag was last cleared.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, e.g. after the store has persisted the map.
    pub fn clear_dirty_flag(&mut self) {
        self.dirty = false;
    }

    /// Build the merged per-execution view: entries from `overrides` win
    /// over entries in `self`. The result starts with a clear dirty flag.
    pub fn merged(&self, overrides: &JobDataMap) -> JobDataMap {
        let mut entries = self.entries.clone();
        for (k, v) in &overrides.entries {
            entries.insert(k.clone(), v.clone());
        }
        JobDataMap {
            entries,
            dirty: false,
        }
    }
}
