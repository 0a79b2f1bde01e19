//! Playback state machine
//!
//! Per room: Empty -> Preloading -> Paused <-> Playing, with Playing ending
//! back in Empty or the next track via the track-end (`CutMusic`) timer.
//! This module exclusively owns `NowPlayingInfo` mutation; every public
//! operation serializes through the per-room lock so a fired timer and a
//! client action cannot interleave their multi-step mutations.
//!
//! Time is tracked as epoch seconds so `duration * ratio` arithmetic stays
//! exact; `progress` is always clamped to [0, 1].

use crate::error::{Error, Result};
use crate::lock::KeyedMutex;
use crate::provider::TrackProvider;
use crate::rooms::{lock_key, RoomStore};
use crate::runtime::RuntimeDirectory;
use crate::timer::{Rearm, TaskKind, TimerRegistry, NEAR_DUE_SECONDS};
use futures::future::{BoxFuture, FutureExt};
use rand::seq::SliceRandom;
use roomcast_common::events::{EventScope, RoomEvent};
use roomcast_common::model::{
    NowPlayingInfo, PlayMode, PlaybackStatus, Room, TrackBrief, TrackDetail, TrackMeta,
};
use roomcast_common::time::{clamp_ratio, epoch_seconds};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A track paused longer than this gets its streaming URL refreshed before
/// resuming; provider playback URLs expire
pub const STALE_SRC_SECONDS: f64 = 300.0;

/// Payload carried by a `CutMusic` task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutMusicPayload {
    pub room_id: Uuid,
    /// Track the timer was armed for; a mismatch at fire time means the
    /// timer is stale and must be ignored
    pub track_id: String,
}

/// Per-room playback service
pub struct Playback {
    rooms: RoomStore,
    registry: Arc<TimerRegistry>,
    provider: Arc<dyn TrackProvider>,
    runtime: Arc<RuntimeDirectory>,
    locks: KeyedMutex,
}

impl Playback {
    pub fn new(
        rooms: RoomStore,
        registry: Arc<TimerRegistry>,
        provider: Arc<dyn TrackProvider>,
        runtime: Arc<RuntimeDirectory>,
        locks: KeyedMutex,
    ) -> Self {
        Self {
            rooms,
            registry,
            provider,
            runtime,
            locks,
        }
    }

    // ---- public operations (each holds the room lock end to end) ----

    /// Resume (or begin) playback of the loaded track
    pub async fn start_playing(&self, room_id: Uuid) -> Result<()> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;
        self.start_locked(&mut room).await
    }

    /// Pause the playing track, folding elapsed time into `progress`
    pub async fn pause_playing(&self, room_id: Uuid) -> Result<()> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;
        self.pause_locked(&mut room).await
    }

    /// Seek to `ratio`; returns the new end time when playing
    pub async fn change_progress(&self, room_id: Uuid, ratio: f64) -> Result<Option<f64>> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;
        self.change_progress_locked(&mut room, ratio).await
    }

    /// Admin skip: advance to the next track per the room's mode
    pub async fn skip(&self, room_id: Uuid) -> Result<()> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;
        self.switch_locked(&mut room).await
    }

    /// Append tracks to the queue, fetching detail for each id.
    ///
    /// Conflict-prone: several sequential provider lookups under one hold.
    /// A concurrent add for the same room fails fast with `Conflict`.
    pub async fn add_tracks(&self, room_id: Uuid, track_ids: &[String]) -> Result<usize> {
        let Some(_guard) = self.locks.try_acquire(&lock_key(room_id)) else {
            return Err(Error::Conflict("another queue update is running".into()));
        };
        let mut room = self.rooms.get(room_id).await?;

        let mut added = 0usize;
        for track_id in track_ids {
            let detail = self.provider.fetch_track_detail(track_id).await?;
            room.queue.push(detail.brief());
            added += 1;
        }
        self.rooms.save(&room).await?;
        self.broadcast_queue(&room);

        // An empty demand room starts its new head immediately
        if room.now_playing.is_none() && room.mode == PlayMode::Demand {
            if let Some(head) = room.queue.first().cloned() {
                self.init_playing_locked(&mut room, head, true).await?;
            }
        }
        Ok(added)
    }

    /// Remove a queued track by position. Position 0 while that track is
    /// loaded means "skip the current track".
    pub async fn remove_track(&self, room_id: Uuid, index: usize) -> Result<()> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;

        if index >= room.queue.len() {
            return Err(Error::Validation(format!(
                "queue position {} out of range",
                index
            )));
        }

        let is_current = index == 0
            && room
                .now_playing
                .as_ref()
                .map(|np| np.track_id == room.queue[0].id)
                .unwrap_or(false);
        if is_current {
            return self.switch_locked(&mut room).await;
        }

        room.queue.remove(index);
        self.rooms.save(&room).await?;
        self.broadcast_queue(&room);
        Ok(())
    }

    /// Record a skip vote; at a majority of online members the track switches
    pub async fn vote_skip(&self, room_id: Uuid, user_id: Uuid) -> Result<(usize, usize)> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;

        if !room.now_playing.as_ref().map(NowPlayingInfo::loaded).unwrap_or(false) {
            return Err(Error::PlaybackNotLoaded);
        }

        if !room.skip_votes.contains(&user_id) {
            room.skip_votes.push(user_id);
        }
        let votes = room.skip_votes.len();
        let needed = self.runtime.online_count(room_id).div_ceil(2).max(1);

        self.runtime.broadcast(
            EventScope::Room(room_id),
            RoomEvent::SkipVotes {
                room_id,
                votes,
                needed,
                timestamp: chrono::Utc::now(),
            },
        );

        if votes >= needed {
            info!("Room {} skip vote passed ({}/{})", room_id, votes, needed);
            self.switch_locked(&mut room).await?;
        } else {
            self.rooms.save(&room).await?;
        }
        Ok((votes, needed))
    }

    /// Handler for fired `CutMusic` tasks
    pub async fn handle_cut_music(&self, payload: CutMusicPayload) -> Result<Rearm> {
        let _guard = self.locks.acquire(&lock_key(payload.room_id)).await;
        let Some(mut room) = self.rooms.load(payload.room_id).await? else {
            // Room destroyed since the timer was armed
            return Ok(Rearm::Done);
        };

        let current = room.now_playing.as_ref().map(|np| np.track_id.as_str());
        if current != Some(payload.track_id.as_str()) {
            debug!(
                "Stale cut_music in room {}: fired for {}, current {:?}",
                payload.room_id, payload.track_id, current
            );
            return Ok(Rearm::Done);
        }

        self.switch_locked(&mut room).await?;
        Ok(Rearm::Done)
    }

    // ---- state transitions (caller holds the room lock) ----

    /// Empty -> Preloading -> Paused, optionally straight into Playing
    pub(crate) async fn init_playing_locked(
        &self,
        room: &mut Room,
        brief: TrackBrief,
        auto_play: bool,
    ) -> Result<()> {
        self.begin_preloading(room, &brief).await?;
        let detail = self.provider.fetch_track_detail(&brief.id).await?;
        self.finish_preloading(room, detail, auto_play).await
    }

    /// Write and broadcast the baseline so clients show something without
    /// waiting on the metadata fetch
    async fn begin_preloading(&self, room: &mut Room, brief: &TrackBrief) -> Result<()> {
        room.now_playing = Some(NowPlayingInfo::preloading(brief));
        room.skip_votes.clear();
        self.rooms.save(room).await?;
        self.broadcast_now_playing(room);
        Ok(())
    }

    /// Overwrite the baseline with full detail; track lands in Paused
    async fn finish_preloading(
        &self,
        room: &mut Room,
        detail: TrackDetail,
        auto_play: bool,
    ) -> Result<()> {
        room.now_playing = Some(NowPlayingInfo {
            track_id: detail.id.clone(),
            status: PlaybackStatus::Paused,
            progress: 0.0,
            duration_seconds: detail.duration_seconds,
            paused_at: Some(epoch_seconds()),
            end_at: None,
            meta: TrackMeta {
                name: detail.name,
                artist: detail.artist,
                src: Some(detail.src),
                lyric: detail.lyric,
                pic: detail.pic,
                comment: detail.comment,
            },
        });
        self.rooms.save(room).await?;
        self.broadcast_now_playing(room);

        if auto_play {
            self.start_locked(room).await?;
        }
        Ok(())
    }

    async fn start_locked(&self, room: &mut Room) -> Result<()> {
        let now = epoch_seconds();
        let (track_id, left, paused_at) = {
            let np = room.now_playing.as_ref().ok_or(Error::PlaybackNotLoaded)?;
            if !np.loaded() {
                return Err(Error::PlaybackNotLoaded);
            }
            if np.status == PlaybackStatus::Playing {
                return Err(Error::Validation("track is already playing".into()));
            }
            (
                np.track_id.clone(),
                np.duration_seconds * (1.0 - np.progress),
                np.paused_at,
            )
        };

        // Streaming URLs expire; refresh after a long pause
        if paused_at.map(|p| now - p > STALE_SRC_SECONDS).unwrap_or(false) {
            debug!("Refreshing expired src for track {} in room {}", track_id, room.id);
            let detail = self.provider.fetch_track_detail(&track_id).await?;
            if let Some(np) = room.now_playing.as_mut() {
                np.meta.src = Some(detail.src);
            }
        }

        // Nothing meaningful left to play: run the switch now instead of
        // arming a near-zero timer
        if left < NEAR_DUE_SECONDS {
            return self.switch_locked(room).await;
        }

        if let Some(old) = room.playback_task_id.take() {
            self.registry.cancel(old).await?;
        }
        let payload = serde_json::to_value(CutMusicPayload {
            room_id: room.id,
            track_id,
        })?;
        let task_id = self.registry.schedule(TaskKind::CutMusic, payload, left).await?;
        room.playback_task_id = Some(task_id);
        if let Some(np) = room.now_playing.as_mut() {
            np.status = PlaybackStatus::Playing;
            np.paused_at = None;
            np.end_at = Some(now + left);
        }
        self.rooms.save(room).await?;
        self.broadcast_now_playing(room);
        Ok(())
    }

    async fn pause_locked(&self, room: &mut Room) -> Result<()> {
        let now = epoch_seconds();
        let end_at = match room.now_playing.as_ref() {
            Some(np) if np.status == PlaybackStatus::Playing => np
                .end_at
                .ok_or_else(|| Error::Invariant("playing track has no end time".into()))?,
            _ => return Err(Error::PlaybackNotLoaded),
        };

        if let Some(task) = room.playback_task_id.take() {
            self.registry.cancel(task).await?;
        }

        let left = end_at - now;
        if left < 0.0 {
            // Clock skew or a missed timer; the track should already have
            // been switched away
            return Err(Error::Invariant(format!(
                "remaining time is negative ({:.3}s)",
                left
            )));
        }

        if let Some(np) = room.now_playing.as_mut() {
            np.progress = clamp_ratio((np.duration_seconds - left) / np.duration_seconds);
            np.status = PlaybackStatus::Paused;
            np.paused_at = Some(now);
            np.end_at = None;
        }
        self.rooms.save(room).await?;
        self.broadcast_now_playing(room);
        Ok(())
    }

    async fn change_progress_locked(&self, room: &mut Room, ratio: f64) -> Result<Option<f64>> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::Validation(format!(
                "progress ratio {} outside [0, 1]",
                ratio
            )));
        }
        let (status, duration) = match room.now_playing.as_ref() {
            Some(np) if np.loaded() => (np.status, np.duration_seconds),
            _ => return Err(Error::PlaybackNotLoaded),
        };

        if let Some(task) = room.playback_task_id.take() {
            self.registry.cancel(task).await?;
        }
        if let Some(np) = room.now_playing.as_mut() {
            np.progress = ratio;
            np.end_at = None;
        }

        let mut new_end = None;
        if status == PlaybackStatus::Playing {
            let now = epoch_seconds();
            let left = duration * (1.0 - ratio);
            if left < NEAR_DUE_SECONDS {
                // Seeking to the very end is just finishing the track
                self.switch_locked(room).await?;
                return Ok(None);
            }
            let track_id = room
                .now_playing
                .as_ref()
                .map(|np| np.track_id.clone())
                .ok_or_else(|| Error::Invariant("now playing vanished during seek".into()))?;
            let payload = serde_json::to_value(CutMusicPayload {
                room_id: room.id,
                track_id,
            })?;
            let task_id = self.registry.schedule(TaskKind::CutMusic, payload, left).await?;
            room.playback_task_id = Some(task_id);
            if let Some(np) = room.now_playing.as_mut() {
                np.end_at = Some(now + left);
            }
            new_end = Some(now + left);
        }

        self.rooms.save(room).await?;
        self.broadcast_now_playing(room);
        Ok(new_end)
    }

    /// Clear the current track; optionally pop it off the queue head
    pub(crate) async fn remove_now_playing_locked(
        &self,
        room: &mut Room,
        pop_from_queue: bool,
    ) -> Result<()> {
        let (was_playing, track_id) = match room.now_playing.as_ref() {
            Some(np) => (np.status == PlaybackStatus::Playing, Some(np.track_id.clone())),
            None => (false, None),
        };

        if was_playing {
            if let Some(task) = room.playback_task_id.take() {
                self.registry.cancel(task).await?;
            }
        }

        if pop_from_queue {
            if let (Some(track_id), Some(head)) = (track_id.as_deref(), room.queue.first()) {
                if head.id == track_id {
                    room.queue.remove(0);
                    self.broadcast_queue(room);
                }
            }
        }

        room.now_playing = None;
        room.skip_votes.clear();
        self.rooms.save(room).await?;
        self.broadcast_now_playing(room);
        Ok(())
    }

    /// Advance playback: demand mode consumes the queue, auto mode draws a
    /// random track from the room's station.
    ///
    /// Boxed because near-due collapsing re-enters this from `start_locked`.
    pub(crate) fn switch_locked<'a>(&'a self, room: &'a mut Room) -> BoxFuture<'a, Result<()>> {
        async move {
            match room.mode {
                PlayMode::Demand => {
                    self.remove_now_playing_locked(room, true).await?;
                    if let Some(head) = room.queue.first().cloned() {
                        self.init_playing_locked(room, head, true).await?;
                    } else {
                        debug!("Room {} queue exhausted; now empty", room.id);
                    }
                }
                PlayMode::Auto { station } => {
                    self.remove_now_playing_locked(room, false).await?;
                    let ids = self.provider.fetch_station_playlist(station).await?;
                    let Some(track_id) = ids.choose(&mut rand::thread_rng()).cloned() else {
                        warn!("Station {:?} returned no tracks for room {}", station, room.id);
                        return Ok(());
                    };
                    let detail = self.provider.fetch_track_detail(&track_id).await?;
                    self.begin_preloading(room, &detail.brief()).await?;
                    self.finish_preloading(room, detail, true).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    // ---- broadcasts ----

    fn broadcast_now_playing(&self, room: &Room) {
        self.runtime.broadcast(
            EventScope::Room(room.id),
            RoomEvent::NowPlayingUpdated {
                room_id: room.id,
                now_playing: room.now_playing.clone(),
                timestamp: chrono::Utc::now(),
            },
        );
    }

    fn broadcast_queue(&self, room: &Room) {
        self.runtime.broadcast(
            EventScope::Room(room.id),
            RoomEvent::QueueUpdated {
                room_id: room.id,
                queue: room.queue.clone(),
                timestamp: chrono::Utc::now(),
            },
        );
    }
}
