//! Event types for the roomcast fan-out system
//!
//! Events are produced by the playback state machine and the lifecycle
//! scheduler and delivered to connected clients over SSE. Each event is
//! scoped: either every member of a room sees it, or only a named set of
//! users (e.g. admin-only online-user digests).

use crate::model::{NowPlayingInfo, PlayMode, RoomStatus, TrackBrief};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a broadcast is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    /// Every user currently joined to the room
    Room(Uuid),
    /// An explicit set of users
    Users(Vec<Uuid>),
}

impl EventScope {
    /// Whether a connection for `user_id`, joined to `room_id`, should see
    /// an event with this scope
    pub fn covers(&self, user_id: Uuid, room_id: Uuid) -> bool {
        match self {
            EventScope::Room(id) => *id == room_id,
            EventScope::Users(ids) => ids.contains(&user_id),
        }
    }
}

/// Roomcast event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    /// Current playback state changed (track switch, play/pause/seek, clear)
    NowPlayingUpdated {
        room_id: Uuid,
        now_playing: Option<NowPlayingInfo>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Play queue contents changed
    QueueUpdated {
        room_id: Uuid,
        queue: Vec<TrackBrief>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic room summary (routine broadcast, every ~60s)
    RoomBaseInfo {
        room_id: Uuid,
        name: String,
        status: RoomStatus,
        mode: PlayMode,
        online_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Online-user digest for room admins (routine broadcast, every ~20s)
    OnlineUsers {
        room_id: Uuid,
        users: Vec<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Room entered the destruction countdown
    RoomWillDestroy {
        room_id: Uuid,
        deadline_epoch_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pending destruction was canceled (creator reconnected)
    RoomDestroyCanceled {
        room_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Room was torn down
    RoomDestroyed {
        room_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Skip-vote tally changed
    SkipVotes {
        room_id: Uuid,
        votes: usize,
        needed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl RoomEvent {
    /// Event name used on the wire (SSE event field)
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::NowPlayingUpdated { .. } => "NowPlayingUpdated",
            RoomEvent::QueueUpdated { .. } => "QueueUpdated",
            RoomEvent::RoomBaseInfo { .. } => "RoomBaseInfo",
            RoomEvent::OnlineUsers { .. } => "OnlineUsers",
            RoomEvent::RoomWillDestroy { .. } => "RoomWillDestroy",
            RoomEvent::RoomDestroyCanceled { .. } => "RoomDestroyCanceled",
            RoomEvent::RoomDestroyed { .. } => "RoomDestroyed",
            RoomEvent::SkipVotes { .. } => "SkipVotes",
        }
    }
}
