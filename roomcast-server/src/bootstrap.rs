//! Service wiring and startup sequence
//!
//! Builds the object graph, installs the task-kind handler table, replays
//! persisted timers, and ensures the hall room plus per-room routines. The
//! handler table is explicit: one registration per task kind, no hidden
//! dispatch.

use crate::error::Result;
use crate::lifecycle::{Lifecycle, RoutinePeriods};
use crate::lock::KeyedMutex;
use crate::playback::{CutMusicPayload, Playback};
use crate::provider::TrackProvider;
use crate::rooms::RoomStore;
use crate::runtime::RuntimeDirectory;
use crate::store::KvStore;
use crate::timer::{handler, TaskKind, TimerRegistry};
use std::sync::Arc;
use tracing::info;

/// The assembled service graph
pub struct App {
    pub rooms: RoomStore,
    pub playback: Arc<Playback>,
    pub lifecycle: Arc<Lifecycle>,
    pub runtime: Arc<RuntimeDirectory>,
    pub registry: Arc<TimerRegistry>,
}

/// Build services and register every task-kind handler
pub fn build(
    store: Arc<dyn KvStore>,
    provider: Arc<dyn TrackProvider>,
    periods: RoutinePeriods,
    destroy_delay_seconds: f64,
) -> App {
    let runtime = Arc::new(RuntimeDirectory::new());
    let locks = KeyedMutex::new();
    let registry = TimerRegistry::new(Arc::clone(&store));
    let rooms = RoomStore::new(Arc::clone(&store));

    let playback = Arc::new(Playback::new(
        rooms.clone(),
        Arc::clone(&registry),
        provider,
        Arc::clone(&runtime),
        locks.clone(),
    ));
    let lifecycle = Arc::new(Lifecycle::new(
        rooms.clone(),
        store,
        Arc::clone(&registry),
        Arc::clone(&runtime),
        locks,
        periods,
        destroy_delay_seconds,
    ));

    // Handler registration table: task kind -> service method
    {
        let playback = Arc::clone(&playback);
        registry.subscribe(
            TaskKind::CutMusic,
            handler(move |task| {
                let playback = Arc::clone(&playback);
                async move {
                    let payload: CutMusicPayload = serde_json::from_value(task.payload)?;
                    playback.handle_cut_music(payload).await
                }
            }),
        );
    }
    {
        let lifecycle = Arc::clone(&lifecycle);
        registry.subscribe(
            TaskKind::DestroyRoom,
            handler(move |task| {
                let lifecycle = Arc::clone(&lifecycle);
                async move { lifecycle.handle_destroy(task).await }
            }),
        );
    }
    {
        let lifecycle = Arc::clone(&lifecycle);
        registry.subscribe(
            TaskKind::BroadcastBaseInfo,
            handler(move |task| {
                let lifecycle = Arc::clone(&lifecycle);
                async move { lifecycle.handle_base_info(task).await }
            }),
        );
    }
    {
        let lifecycle = Arc::clone(&lifecycle);
        registry.subscribe(
            TaskKind::DispatchOnlineUsers,
            handler(move |task| {
                let lifecycle = Arc::clone(&lifecycle);
                async move { lifecycle.handle_online_users(task).await }
            }),
        );
    }
    {
        let lifecycle = Arc::clone(&lifecycle);
        registry.subscribe(
            TaskKind::CheckCreatorOnline,
            handler(move |task| {
                let lifecycle = Arc::clone(&lifecycle);
                async move { lifecycle.handle_creator_check(task).await }
            }),
        );
    }

    App {
        rooms,
        playback,
        lifecycle,
        runtime,
        registry,
    }
}

/// Startup sequence: replay persisted timers, then (re)start room routines
pub async fn start(app: &App) -> Result<()> {
    // Timers become live here; overdue tasks fire during this call
    app.registry.initialize().await?;

    // Re-adopt surviving routine chains before ensure, so a restart does
    // not double-arm them
    app.lifecycle.adopt_persisted_routines().await?;

    let hall = app.rooms.ensure_hall().await?;
    app.lifecycle.ensure_routines(&hall).await?;

    let room_ids = app.rooms.list_ids().await?;
    for room_id in &room_ids {
        if let Some(room) = app.rooms.load(*room_id).await? {
            if !room.is_hall() {
                app.lifecycle.ensure_routines(&room).await?;
            }
        }
    }
    info!("Bootstrap complete: {} rooms live", room_ids.len());
    Ok(())
}
