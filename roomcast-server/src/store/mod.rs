//! Durable key/value store
//!
//! The single source of truth for everything that must survive a restart:
//! room entities, scheduled tasks, destroy records. Every read/modify/write
//! is one unprotected round trip; there are no cross-key transactions and
//! the store accepts last-writer-wins semantics.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Key namespaces; ids are listed by prefix
pub fn task_key(id: Uuid) -> String {
    format!("task:{}", id)
}

pub fn room_key(id: Uuid) -> String {
    format!("room:{}", id)
}

pub fn destroy_key(room_id: Uuid) -> String {
    format!("destroy:{}", room_id)
}

pub const TASK_PREFIX: &str = "task:";
pub const ROOM_PREFIX: &str = "room:";

/// JSON key/value store contract
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a record; `None` if the key does not exist
    async fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Write a record, replacing any existing value
    async fn put(&self, id: &str, value: &Value) -> Result<()>;

    /// Write only if the key does not exist; returns whether the write won
    async fn put_if_absent(&self, id: &str, value: &Value) -> Result<bool>;

    /// Delete a record; deleting an absent key is not an error
    async fn delete(&self, id: &str) -> Result<()>;

    /// All ids starting with `prefix`
    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Typed helpers layered over the raw JSON contract
pub struct TypedStore;

impl TypedStore {
    pub async fn get<T: DeserializeOwned>(store: &Arc<dyn KvStore>, id: &str) -> Result<Option<T>> {
        match store.get(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(store: &Arc<dyn KvStore>, id: &str, value: &T) -> Result<()> {
        store.put(id, &serde_json::to_value(value)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespaces_are_disjoint() {
        let id = Uuid::new_v4();
        assert!(task_key(id).starts_with(TASK_PREFIX));
        assert!(room_key(id).starts_with(ROOM_PREFIX));
        assert!(!destroy_key(id).starts_with(TASK_PREFIX));
        assert!(!destroy_key(id).starts_with(ROOM_PREFIX));
    }
}
