//! In-memory key/value store
//!
//! Used by tests, including the restart simulation: two registry instances
//! sharing one `MemoryStore` behave like one process dying and another
//! initializing from the same durable state.

use crate::error::Result;
use crate::store::KvStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Key/value store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    // BTreeMap keeps list_ids ordered like the SQLite impl
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, id: &str, value: &Value) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(id.to_string(), value.clone());
        Ok(())
    }

    async fn put_if_absent(&self, id: &str, value: &Value) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(id) {
            Ok(false)
        } else {
            entries.insert(id.to_string(), value.clone());
            Ok(true)
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
