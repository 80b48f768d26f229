//! In-process store backend.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Ephemeral (namespace, key) → value map. Cheap to clone; clones share data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<(String, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.data
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn set(&self, namespace: &str, key: &str, value: Value) {
        self.data
            .insert((namespace.to_string(), key.to_string()), value);
    }
}
