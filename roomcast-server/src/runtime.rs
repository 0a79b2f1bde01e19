//! Runtime directory
//!
//! One explicit service for what used to be ambient globals: which users
//! have a live connection, which room each online user occupies, and the
//! broadcast channel SSE connections subscribe to. Populated on
//! connect/join, cleared on disconnect/destroy.

use roomcast_common::events::{EventScope, RoomEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// An event paired with its delivery scope
#[derive(Debug, Clone)]
pub struct Envelope {
    pub scope: EventScope,
    pub event: RoomEvent,
}

#[derive(Default)]
struct DirectoryInner {
    /// Users with at least one live transport connection
    connected: HashSet<Uuid>,
    /// Room membership of online users
    members: HashMap<Uuid, HashSet<Uuid>>,
    /// Reverse pointer: which room a user is joined to
    joined_room: HashMap<Uuid, Uuid>,
}

/// Connection and membership registry plus event fan-out
pub struct RuntimeDirectory {
    inner: Mutex<DirectoryInner>,
    event_tx: broadcast::Sender<Envelope>,
}

impl RuntimeDirectory {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(DirectoryInner::default()),
            event_tx,
        }
    }

    /// Mark a user connected (transport session opened)
    pub fn connect(&self, user_id: Uuid) {
        self.inner.lock().unwrap().connected.insert(user_id);
    }

    /// Drop a user's connection and any room membership
    pub fn disconnect(&self, user_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected.remove(&user_id);
        if let Some(room_id) = inner.joined_room.remove(&user_id) {
            if let Some(members) = inner.members.get_mut(&room_id) {
                members.remove(&user_id);
                if members.is_empty() {
                    inner.members.remove(&room_id);
                }
            }
        }
    }

    /// Join a room, leaving any previously joined room first
    pub fn join_room(&self, room_id: Uuid, user_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected.insert(user_id);
        if let Some(previous) = inner.joined_room.insert(user_id, room_id) {
            if previous != room_id {
                if let Some(members) = inner.members.get_mut(&previous) {
                    members.remove(&user_id);
                    if members.is_empty() {
                        inner.members.remove(&previous);
                    }
                }
            }
        }
        inner.members.entry(room_id).or_default().insert(user_id);
        debug!("User {} joined room {}", user_id, room_id);
    }

    pub fn leave_room(&self, room_id: Uuid, user_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if inner.joined_room.get(&user_id) == Some(&room_id) {
            inner.joined_room.remove(&user_id);
        }
        if let Some(members) = inner.members.get_mut(&room_id) {
            members.remove(&user_id);
            if members.is_empty() {
                inner.members.remove(&room_id);
            }
        }
    }

    /// Whether the user has a live connection
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.lock().unwrap().connected.contains(&user_id)
    }

    /// Online users currently joined to a room (sorted for stable output)
    pub fn online_users(&self, room_id: Uuid) -> Vec<Uuid> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<Uuid> = inner
            .members
            .get(&room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    pub fn online_count(&self, room_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .members
            .get(&room_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Evict every member of a room (destroy teardown); returns who was in
    pub fn clear_room(&self, room_id: Uuid) -> Vec<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        let members: Vec<Uuid> = inner
            .members
            .remove(&room_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for user_id in &members {
            inner.joined_room.remove(user_id);
        }
        members
    }

    /// Fan an event out to its scope. Send errors (no receivers) are fine.
    pub fn broadcast(&self, scope: EventScope, event: RoomEvent) {
        let _ = self.event_tx.send(Envelope { scope, event });
    }

    /// Subscribe to the event stream (SSE connections)
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }
}

impl Default for RuntimeDirectory {
    fn default() -> Self {
        Self::new()
    }
}
