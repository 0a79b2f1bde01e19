//! # Roomcast Common Library
//!
//! Shared code for the roomcast backend:
//! - Domain model (rooms, tracks, now-playing state)
//! - Event types (RoomEvent enum) broadcast to connected clients
//! - Timestamp utilities (epoch-seconds arithmetic)

pub mod events;
pub mod model;
pub mod time;

pub use events::{EventScope, RoomEvent};
pub use model::{
    NowPlayingInfo, PlayMode, PlaybackStatus, Room, RoomStatus, StationKind, TrackBrief,
    TrackDetail, TrackMeta,
};
