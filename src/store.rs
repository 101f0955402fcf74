//! Local key-value persistence and an injectable TTL cache.
//!
//! The store only caches what the user last saw (selected target, outstanding
//! items, last outcome). Reconciliation never depends on it for correctness.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StoreError;

pub const SELECTED_TARGET: &str = "selected_target";
pub const OUTSTANDING_ITEMS: &str = "outstanding_items";
pub const LAST_OUTCOME: &str = "last_outcome";
pub const LAST_ATTEMPTED_AT: &str = "last_attempted_at";

pub trait KeyValueStore: Send + Sync {
    /// Returns the stored values for whichever of `keys` exist.
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError>;
    fn set(&self, values: Map<String, Value>) -> Result<(), StoreError>;
    fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// Reads and deserializes a single key. Missing, unreadable or mistyped
/// values all come back as `None`.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match store.get(&[key]) {
        Ok(mut values) => values
            .remove(key)
            .and_then(|v| serde_json::from_value(v).ok()),
        Err(e) => {
            warn!(key, error = %e, "failed to read local state");
            None
        }
    }
}

/// Serializes and writes a single key, logging instead of failing.
pub fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let value = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "failed to serialize local state");
            return;
        }
    };
    let mut values = Map::new();
    values.insert(key.to_string(), value);
    if let Err(e) = store.set(values) {
        warn!(key, error = %e, "failed to write local state");
    }
}

/// A store backed by a single JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut all = self.read_all()?;
        Ok(keys
            .iter()
            .filter_map(|k| all.remove(*k).map(|v| (k.to_string(), v)))
            .collect())
    }

    fn set(&self, values: Map<String, Value>) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut all = self.read_all()?;
        all.extend(values);
        self.write_all(&all)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut all = self.read_all()?;
        for key in keys {
            all.remove(*key);
        }
        self.write_all(&all)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, values: Map<String, Value>) -> Result<(), StoreError> {
        let mut current = self.values.lock().unwrap_or_else(|p| p.into_inner());
        current.extend(values);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut current = self.values.lock().unwrap_or_else(|p| p.into_inner());
        for key in keys {
            current.remove(*key);
        }
        Ok(())
    }
}

/// A single cached value with a time-to-live.
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    data: Option<T>,
    timestamp: Option<Instant>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: None,
            timestamp: None,
            ttl,
        }
    }

    pub fn is_valid(&self) -> bool {
        match (&self.data, self.timestamp) {
            (Some(_), Some(at)) => at.elapsed() < self.ttl,
            _ => false,
        }
    }

    /// The cached value, if it has not expired.
    pub fn get(&self) -> Option<T> {
        if self.is_valid() {
            self.data.clone()
        } else {
            None
        }
    }

    pub fn set(&mut self, data: T) {
        self.data = Some(data);
        self.timestamp = Some(Instant::now());
    }

    pub fn invalidate(&mut self) {
        self.data = None;
        self.timestamp = None;
    }
}
