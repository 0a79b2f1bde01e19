//! Domain model for shared listening rooms
//!
//! A `Room` is the unit of persistence: the whole record (queue, membership
//! roles, playback state) is written to the key/value store wholesale and
//! read back on the next operation. Last-writer-wins semantics apply.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    WillDestroy,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Active => write!(f, "active"),
            RoomStatus::WillDestroy => write!(f, "will_destroy"),
        }
    }
}

/// Source list used for random track selection in auto mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    Hot,
    Emerging,
}

/// How a room advances to the next track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayMode {
    /// Advance through the explicit, ordered queue
    Demand,
    /// Advance by random selection from a station playlist
    Auto { station: StationKind },
}

/// Minimal track info carried in the play queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackBrief {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub duration_seconds: f64,
}

/// Full track info as returned by the metadata provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDetail {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub duration_seconds: f64,
    /// Streaming URL; providers expire these, see the staleness refresh
    pub src: String,
    pub lyric: Option<String>,
    pub pic: Option<String>,
    pub comment: Option<String>,
}

impl TrackDetail {
    pub fn brief(&self) -> TrackBrief {
        TrackBrief {
            id: self.id.clone(),
            name: self.name.clone(),
            artist: self.artist.clone(),
            duration_seconds: self.duration_seconds,
        }
    }
}

/// Display metadata for the current track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub name: String,
    pub artist: String,
    pub src: Option<String>,
    pub lyric: Option<String>,
    pub pic: Option<String>,
    pub comment: Option<String>,
}

/// Playback status of the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Preloading,
    Paused,
    Playing,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Preloading => write!(f, "preloading"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Playing => write!(f, "playing"),
        }
    }
}

/// The room's current playback state; at most one live instance per room
///
/// Invariant: `end_at` is `Some` if and only if `status == Playing`.
/// While paused or preloading, `progress` plus `paused_at` describe position.
/// All wall-clock fields are epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingInfo {
    pub track_id: String,
    pub status: PlaybackStatus,
    /// Position in the track as a ratio, always clamped to [0, 1]
    pub progress: f64,
    pub duration_seconds: f64,
    pub paused_at: Option<f64>,
    pub end_at: Option<f64>,
    pub meta: TrackMeta,
}

impl NowPlayingInfo {
    /// Baseline state broadcast before the full metadata fetch completes
    pub fn preloading(brief: &TrackBrief) -> Self {
        Self {
            track_id: brief.id.clone(),
            status: PlaybackStatus::Preloading,
            progress: 0.0,
            duration_seconds: brief.duration_seconds,
            paused_at: None,
            end_at: None,
            meta: TrackMeta {
                name: brief.name.clone(),
                artist: brief.artist.clone(),
                ..TrackMeta::default()
            },
        }
    }

    /// Whether the metadata fetch has completed
    pub fn loaded(&self) -> bool {
        self.status != PlaybackStatus::Preloading
    }
}

/// A shared listening room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub status: RoomStatus,
    pub mode: PlayMode,
    pub creator_id: Uuid,
    pub admin_ids: Vec<Uuid>,
    pub queue: Vec<TrackBrief>,
    pub now_playing: Option<NowPlayingInfo>,
    /// Id of the armed track-end timer, if any; kept in the persisted record
    /// so cancel-before-rearm works across restarts
    pub playback_task_id: Option<Uuid>,
    pub skip_votes: Vec<Uuid>,
}

impl Room {
    /// Well-known id of the always-present hall room
    pub fn hall_id() -> Uuid {
        Uuid::nil()
    }

    pub fn new(name: impl Into<String>, mode: PlayMode, creator_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: RoomStatus::Active,
            mode,
            creator_id,
            admin_ids: vec![creator_id],
            queue: Vec::new(),
            now_playing: None,
            playback_task_id: None,
            skip_votes: Vec::new(),
        }
    }

    /// The hall room: auto mode, no owning creator, never destructible
    pub fn hall() -> Self {
        Self {
            id: Self::hall_id(),
            name: "Hall".to_string(),
            status: RoomStatus::Active,
            mode: PlayMode::Auto {
                station: StationKind::Hot,
            },
            creator_id: Self::hall_id(),
            admin_ids: Vec::new(),
            queue: Vec::new(),
            now_playing: None,
            playback_task_id: None,
            skip_votes: Vec::new(),
        }
    }

    pub fn is_hall(&self) -> bool {
        self.id == Self::hall_id()
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        user_id == self.creator_id || self.admin_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preloading_baseline() {
        let brief = TrackBrief {
            id: "t1".to_string(),
            name: "Song".to_string(),
            artist: "Artist".to_string(),
            duration_seconds: 200.0,
        };
        let np = NowPlayingInfo::preloading(&brief);
        assert_eq!(np.status, PlaybackStatus::Preloading);
        assert_eq!(np.progress, 0.0);
        assert!(np.end_at.is_none());
        assert!(np.meta.src.is_none());
        assert!(!np.loaded());
    }

    #[test]
    fn test_hall_room_identity() {
        let hall = Room::hall();
        assert!(hall.is_hall());
        assert_eq!(hall.id, Room::hall_id());

        let other = Room::new("r", PlayMode::Demand, Uuid::new_v4());
        assert!(!other.is_hall());
    }

    #[test]
    fn test_room_admin_membership() {
        let creator = Uuid::new_v4();
        let mut room = Room::new("r", PlayMode::Demand, creator);
        assert!(room.is_admin(creator));

        let other = Uuid::new_v4();
        assert!(!room.is_admin(other));
        room.admin_ids.push(other);
        assert!(room.is_admin(other));
    }

    #[test]
    fn test_room_serde_round_trip() {
        let mut room = Room::new(
            "late night",
            PlayMode::Auto {
                station: StationKind::Emerging,
            },
            Uuid::new_v4(),
        );
        room.queue.push(TrackBrief {
            id: "t9".to_string(),
            name: "n".to_string(),
            artist: "a".to_string(),
            duration_seconds: 123.5,
        });
        let json = serde_json::to_value(&room).unwrap();
        let back: Room = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, room.id);
        assert_eq!(back.queue.len(), 1);
        assert_eq!(back.mode, room.mode);
    }
}
