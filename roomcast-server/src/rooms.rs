//! Room persistence over the key/value store

use crate::error::{Error, Result};
use crate::store::{room_key, KvStore, TypedStore, ROOM_PREFIX};
use roomcast_common::model::Room;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// KeyedMutex key serializing all multi-step operations on one room
pub fn lock_key(room_id: Uuid) -> String {
    format!("room-ops:{}", room_id)
}

/// Typed access to persisted room entities
#[derive(Clone)]
pub struct RoomStore {
    store: Arc<dyn KvStore>,
}

impl RoomStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, room_id: Uuid) -> Result<Option<Room>> {
        TypedStore::get(&self.store, &room_key(room_id)).await
    }

    /// Load a room that must exist
    pub async fn get(&self, room_id: Uuid) -> Result<Room> {
        self.load(room_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("room {}", room_id)))
    }

    pub async fn save(&self, room: &Room) -> Result<()> {
        TypedStore::put(&self.store, &room_key(room.id), room).await
    }

    pub async fn delete(&self, room_id: Uuid) -> Result<()> {
        self.store.delete(&room_key(room_id)).await
    }

    /// Ids of all persisted rooms
    pub async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let keys = self.store.list_ids(ROOM_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(ROOM_PREFIX))
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect())
    }

    /// Create the hall room if this is a fresh store
    pub async fn ensure_hall(&self) -> Result<Room> {
        let hall = Room::hall();
        let value = serde_json::to_value(&hall)?;
        if self
            .store
            .put_if_absent(&room_key(hall.id), &value)
            .await?
        {
            info!("Created hall room {}", hall.id);
        }
        self.get(hall.id).await
    }
}
