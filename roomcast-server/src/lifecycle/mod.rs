//! Room lifecycle scheduling
//!
//! Two concerns per room: recurring housekeeping (periodic base-info
//! broadcast, online-user digest for admins, creator liveness check) and
//! delayed destruction when a room is abandoned. Both ride on the durable
//! timer registry; recurrence uses the registry's rearm contract so the
//! period drifts by execution time, not wall clock.

use crate::error::{Error, Result};
use crate::lock::KeyedMutex;
use crate::rooms::{lock_key, RoomStore};
use crate::runtime::RuntimeDirectory;
use crate::store::{destroy_key, KvStore, TypedStore, TASK_PREFIX};
use crate::timer::{Rearm, ScheduledTask, TaskKind, TimerRegistry};
use roomcast_common::events::{EventScope, RoomEvent};
use roomcast_common::model::{Room, RoomStatus};
use roomcast_common::time::epoch_seconds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default delay before an abandoned room is torn down
pub const DEFAULT_DESTROY_DELAY_SECONDS: f64 = 300.0;

// Periods close enough to count as the same routine signature
const PERIOD_EPSILON: f64 = 1e-6;

/// Routine cadences, overridable through configuration
#[derive(Debug, Clone, Copy)]
pub struct RoutinePeriods {
    pub base_info_seconds: f64,
    pub online_users_seconds: f64,
    pub creator_check_seconds: f64,
}

impl Default for RoutinePeriods {
    fn default() -> Self {
        Self {
            base_info_seconds: 60.0,
            online_users_seconds: 20.0,
            creator_check_seconds: 60.0,
        }
    }
}

/// Payload for room-scoped tasks (routines and destroy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPayload {
    pub room_id: Uuid,
}

/// Pending destruction bookkeeping, persisted at `destroy:{room}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRecord {
    pub scheduled_task_id: Uuid,
    pub previous_status: RoomStatus,
}

struct RoutineEntry {
    period: f64,
    task_id: Uuid,
}

/// Per-room recurring housekeeping and delayed destruction
pub struct Lifecycle {
    rooms: RoomStore,
    store: Arc<dyn KvStore>,
    registry: Arc<TimerRegistry>,
    runtime: Arc<RuntimeDirectory>,
    locks: KeyedMutex,
    periods: RoutinePeriods,
    destroy_delay: f64,
    /// Last recorded signature per (room, kind); the idempotent-start guard
    routines: Mutex<HashMap<(Uuid, TaskKind), RoutineEntry>>,
}

impl Lifecycle {
    pub fn new(
        rooms: RoomStore,
        store: Arc<dyn KvStore>,
        registry: Arc<TimerRegistry>,
        runtime: Arc<RuntimeDirectory>,
        locks: KeyedMutex,
        periods: RoutinePeriods,
        destroy_delay: f64,
    ) -> Self {
        Self {
            rooms,
            store,
            registry,
            runtime,
            locks,
            periods,
            destroy_delay,
            routines: Mutex::new(HashMap::new()),
        }
    }

    /// Configured delay used when callers do not supply one
    pub fn default_destroy_delay(&self) -> f64 {
        self.destroy_delay
    }

    // ---- routine tasks ----

    /// Start (or re-validate) every routine this room should have.
    /// Safe to call repeatedly, e.g. on redundant room (re)initialization.
    pub async fn ensure_routines(&self, room: &Room) -> Result<()> {
        self.ensure_routine(room.id, TaskKind::BroadcastBaseInfo, self.periods.base_info_seconds)
            .await?;
        self.ensure_routine(
            room.id,
            TaskKind::DispatchOnlineUsers,
            self.periods.online_users_seconds,
        )
        .await?;
        // The hall has no owning creator to watch
        if !room.is_hall() {
            self.ensure_routine(
                room.id,
                TaskKind::CheckCreatorOnline,
                self.periods.creator_check_seconds,
            )
            .await?;
        }
        Ok(())
    }

    /// Idempotent start for one routine: unchanged signature and already
    /// armed is a no-op; otherwise cancel any existing chain and arm fresh.
    pub async fn ensure_routine(&self, room_id: Uuid, kind: TaskKind, period: f64) -> Result<()> {
        // Serialize concurrent starts for the same room so two callers
        // cannot both arm a chain
        let _guard = self.locks.acquire(&routine_lock_key(room_id)).await;

        let existing = {
            let routines = self.routines.lock().unwrap();
            routines
                .get(&(room_id, kind))
                .map(|e| (e.period, e.task_id))
        };
        if let Some((period_now, task_id)) = existing {
            if (period_now - period).abs() < PERIOD_EPSILON {
                return Ok(());
            }
            debug!(
                "Routine {} for room {} changed period {} -> {}; rearming",
                kind, room_id, period_now, period
            );
            self.registry.cancel(task_id).await?;
        }

        let payload = serde_json::to_value(RoomPayload { room_id })?;
        let task_id = self.registry.schedule(kind, payload, period).await?;
        self.routines
            .lock()
            .unwrap()
            .insert((room_id, kind), RoutineEntry { period, task_id });
        Ok(())
    }

    /// Cancel every routine chain for a room
    pub async fn stop_routines(&self, room_id: Uuid) -> Result<()> {
        let entries: Vec<Uuid> = {
            let mut routines = self.routines.lock().unwrap();
            let keys: Vec<(Uuid, TaskKind)> = routines
                .keys()
                .filter(|(id, _)| *id == room_id)
                .copied()
                .collect();
            keys.iter()
                .filter_map(|k| routines.remove(k).map(|e| e.task_id))
                .collect()
        };
        for task_id in entries {
            self.registry.cancel(task_id).await?;
        }
        Ok(())
    }

    /// After a restart the in-memory signature map is empty but persisted
    /// routine tasks keep firing; re-adopt them so stop/ensure keep working.
    fn adopt_routine(&self, room_id: Uuid, kind: TaskKind, period: f64, task_id: Uuid) {
        self.routines
            .lock()
            .unwrap()
            .entry((room_id, kind))
            .or_insert(RoutineEntry { period, task_id });
    }

    /// Scan persisted tasks for surviving routine chains and adopt them
    /// into the signature map. Run once at startup, after the registry has
    /// re-armed timers and before `ensure_routines`, so a restart does not
    /// arm a second chain next to a live one.
    pub async fn adopt_persisted_routines(&self) -> Result<()> {
        let keys = self.store.list_ids(TASK_PREFIX).await?;
        let mut adopted = 0usize;
        for key in keys {
            let Some(task) = TypedStore::get::<ScheduledTask>(&self.store, &key).await? else {
                continue;
            };
            let period = match task.kind {
                TaskKind::BroadcastBaseInfo => self.periods.base_info_seconds,
                TaskKind::DispatchOnlineUsers => self.periods.online_users_seconds,
                TaskKind::CheckCreatorOnline => self.periods.creator_check_seconds,
                TaskKind::CutMusic | TaskKind::DestroyRoom => continue,
            };
            let payload: RoomPayload = serde_json::from_value(task.payload)?;
            self.adopt_routine(payload.room_id, task.kind, period, task.id);
            adopted += 1;
        }
        if adopted > 0 {
            debug!("Adopted {} persisted routine chains", adopted);
        }
        Ok(())
    }

    /// Fired `BroadcastBaseInfo`: room summary to every member
    pub async fn handle_base_info(&self, task: ScheduledTask) -> Result<Rearm> {
        let payload: RoomPayload = serde_json::from_value(task.payload)?;
        let Some(room) = self.rooms.load(payload.room_id).await? else {
            return Ok(Rearm::Done);
        };

        let period = self.periods.base_info_seconds;
        self.adopt_routine(room.id, TaskKind::BroadcastBaseInfo, period, task.id);
        self.runtime.broadcast(
            EventScope::Room(room.id),
            RoomEvent::RoomBaseInfo {
                room_id: room.id,
                name: room.name.clone(),
                status: room.status,
                mode: room.mode,
                online_count: self.runtime.online_count(room.id),
                timestamp: chrono::Utc::now(),
            },
        );
        Ok(Rearm::After(period))
    }

    /// Fired `DispatchOnlineUsers`: online digest, admins only
    pub async fn handle_online_users(&self, task: ScheduledTask) -> Result<Rearm> {
        let payload: RoomPayload = serde_json::from_value(task.payload)?;
        let Some(room) = self.rooms.load(payload.room_id).await? else {
            return Ok(Rearm::Done);
        };

        let period = self.periods.online_users_seconds;
        self.adopt_routine(room.id, TaskKind::DispatchOnlineUsers, period, task.id);

        let mut recipients = room.admin_ids.clone();
        if !recipients.contains(&room.creator_id) {
            recipients.push(room.creator_id);
        }
        self.runtime.broadcast(
            EventScope::Users(recipients),
            RoomEvent::OnlineUsers {
                room_id: room.id,
                users: self.runtime.online_users(room.id),
                timestamp: chrono::Utc::now(),
            },
        );
        Ok(Rearm::After(period))
    }

    /// Fired `CheckCreatorOnline`: start the destroy countdown when the
    /// creator has no live connection
    pub async fn handle_creator_check(&self, task: ScheduledTask) -> Result<Rearm> {
        let payload: RoomPayload = serde_json::from_value(task.payload)?;
        let Some(room) = self.rooms.load(payload.room_id).await? else {
            return Ok(Rearm::Done);
        };

        let period = self.periods.creator_check_seconds;
        self.adopt_routine(room.id, TaskKind::CheckCreatorOnline, period, task.id);

        // A room already counting down keeps its deadline; re-triggering
        // would push it forward every tick
        if room.status != RoomStatus::WillDestroy && !self.runtime.is_online(room.creator_id) {
            info!(
                "Creator {} of room {} is offline; scheduling destruction",
                room.creator_id, room.id
            );
            self.destroy(room.id, self.destroy_delay).await?;
        }
        Ok(Rearm::After(period))
    }

    // ---- delayed destruction ----

    /// Schedule destruction after `delay_seconds`, replacing any pending one
    pub async fn destroy(&self, room_id: Uuid, delay_seconds: f64) -> Result<()> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;
        if room.is_hall() {
            return Err(Error::Validation("the hall room cannot be destroyed".into()));
        }

        // Replace a pending countdown but keep the original pre-countdown
        // status for a later cancel
        let mut previous_status = room.status;
        let key = destroy_key(room_id);
        if let Some(record) = TypedStore::get::<DestroyRecord>(&self.store, &key).await? {
            self.registry.cancel(record.scheduled_task_id).await?;
            self.store.delete(&key).await?;
            previous_status = record.previous_status;
        }

        let payload = serde_json::to_value(RoomPayload { room_id })?;
        let task_id = self
            .registry
            .schedule(TaskKind::DestroyRoom, payload, delay_seconds)
            .await?;
        TypedStore::put(
            &self.store,
            &key,
            &DestroyRecord {
                scheduled_task_id: task_id,
                previous_status,
            },
        )
        .await?;

        room.status = RoomStatus::WillDestroy;
        self.rooms.save(&room).await?;
        self.runtime.broadcast(
            EventScope::Room(room_id),
            RoomEvent::RoomWillDestroy {
                room_id,
                deadline_epoch_seconds: epoch_seconds() + delay_seconds,
                timestamp: chrono::Utc::now(),
            },
        );
        info!("Room {} will be destroyed in {:.0}s", room_id, delay_seconds);
        Ok(())
    }

    /// Abort a pending destruction; returns whether one was pending
    pub async fn cancel_destroy(&self, room_id: Uuid) -> Result<bool> {
        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let mut room = self.rooms.get(room_id).await?;

        let key = destroy_key(room_id);
        let record = TypedStore::get::<DestroyRecord>(&self.store, &key).await?;
        let (Some(record), RoomStatus::WillDestroy) = (record, room.status) else {
            return Ok(false);
        };

        self.registry.cancel(record.scheduled_task_id).await?;
        self.store.delete(&key).await?;
        room.status = record.previous_status;
        self.rooms.save(&room).await?;
        self.runtime.broadcast(
            EventScope::Room(room_id),
            RoomEvent::RoomDestroyCanceled {
                room_id,
                timestamp: chrono::Utc::now(),
            },
        );
        info!("Destruction of room {} canceled", room_id);
        Ok(true)
    }

    /// Fired `DestroyRoom`: full teardown
    pub async fn handle_destroy(&self, task: ScheduledTask) -> Result<Rearm> {
        let payload: RoomPayload = serde_json::from_value(task.payload)?;
        let room_id = payload.room_id;

        let _guard = self.locks.acquire(&lock_key(room_id)).await;
        let Some(room) = self.rooms.load(room_id).await? else {
            self.store.delete(&destroy_key(room_id)).await?;
            return Ok(Rearm::Done);
        };

        info!("Destroying room {} ({})", room_id, room.name);
        self.runtime.broadcast(
            EventScope::Room(room_id),
            RoomEvent::RoomDestroyed {
                room_id,
                timestamp: chrono::Utc::now(),
            },
        );

        if let Some(playback_task) = room.playback_task_id {
            self.registry.cancel(playback_task).await?;
        }
        self.stop_routines(room_id).await?;
        let evicted = self.runtime.clear_room(room_id);
        if !evicted.is_empty() {
            debug!("Evicted {} members from room {}", evicted.len(), room_id);
        }
        self.rooms.delete(room_id).await?;
        self.store.delete(&destroy_key(room_id)).await?;
        Ok(Rearm::Done)
    }

    /// A creator rejoining a room under countdown rescues it
    pub async fn on_creator_reconnect(&self, room_id: Uuid, user_id: Uuid) -> Result<()> {
        let room = self.rooms.get(room_id).await?;
        if room.creator_id == user_id && room.status == RoomStatus::WillDestroy {
            if !self.cancel_destroy(room_id).await? {
                warn!(
                    "Room {} is in countdown but has no destroy record",
                    room_id
                );
            }
        }
        Ok(())
    }
}

fn routine_lock_key(room_id: Uuid) -> String {
    format!("routines:{}", room_id)
}
