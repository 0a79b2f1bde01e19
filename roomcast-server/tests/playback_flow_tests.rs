//! Demand-mode playback driven by real track-end timers
//!
//! Uses sub-second track durations so the wired `CutMusic` path runs for
//! real: queue two tracks, let the first expire, watch the head advance,
//! then exhaust the queue.

mod helpers;

use helpers::{make_room, test_app, track};
use roomcast_common::events::RoomEvent;
use roomcast_common::model::PlaybackStatus;
use roomcast_server::provider::StaticTrackProvider;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_track_end_advances_the_queue() {
    let provider = StaticTrackProvider::new()
        .with_track(track("short", 0.5))
        .with_track(track("long", 300.0));
    let tapp = test_app(provider, 300.0).await;
    let room = make_room(&tapp, Uuid::new_v4()).await;

    tapp.app
        .playback
        .add_tracks(room.id, &["short".to_string(), "long".to_string()])
        .await
        .unwrap();

    // The head auto-started; half a second later its timer fires and the
    // next track takes over
    let loaded = tapp.app.rooms.get(room.id).await.unwrap();
    assert_eq!(loaded.now_playing.as_ref().unwrap().track_id, "short");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let advanced = tapp.app.rooms.get(room.id).await.unwrap();
    let np = advanced.now_playing.unwrap();
    assert_eq!(np.track_id, "long");
    assert_eq!(np.status, PlaybackStatus::Playing);
    assert_eq!(advanced.queue.len(), 1);
}

#[tokio::test]
async fn test_queue_exhaustion_ends_in_empty() {
    let provider = StaticTrackProvider::new().with_track(track("only", 0.5));
    let tapp = test_app(provider, 300.0).await;
    let room = make_room(&tapp, Uuid::new_v4()).await;

    tapp.app
        .playback
        .add_tracks(room.id, &["only".to_string()])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let drained = tapp.app.rooms.get(room.id).await.unwrap();
    assert!(drained.now_playing.is_none());
    assert!(drained.queue.is_empty());
    assert!(drained.playback_task_id.is_none());
}

#[tokio::test]
async fn test_pause_disarms_the_track_end_timer() {
    let provider = StaticTrackProvider::new().with_track(track("t1", 0.6));
    let tapp = test_app(provider, 300.0).await;
    let room = make_room(&tapp, Uuid::new_v4()).await;

    tapp.app
        .playback
        .add_tracks(room.id, &["t1".to_string()])
        .await
        .unwrap();
    tapp.app.playback.pause_playing(room.id).await.unwrap();

    // The original due time comes and goes; the paused track stays loaded
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let paused = tapp.app.rooms.get(room.id).await.unwrap();
    let np = paused.now_playing.unwrap();
    assert_eq!(np.track_id, "t1");
    assert_eq!(np.status, PlaybackStatus::Paused);
}

#[tokio::test]
async fn test_room_members_see_now_playing_broadcasts() {
    let provider = StaticTrackProvider::new().with_track(track("t1", 300.0));
    let tapp = test_app(provider, 300.0).await;
    let room = make_room(&tapp, Uuid::new_v4()).await;
    let mut rx = tapp.app.runtime.subscribe();

    tapp.app
        .playback
        .add_tracks(room.id, &["t1".to_string()])
        .await
        .unwrap();

    // Queue update, preloading baseline, loaded detail, playing
    let mut saw_playing = false;
    for _ in 0..4 {
        let envelope = rx.recv().await.unwrap();
        if let RoomEvent::NowPlayingUpdated { now_playing, .. } = &envelope.event {
            if let Some(np) = now_playing {
                saw_playing |= np.status == PlaybackStatus::Playing;
            }
        }
    }
    assert!(saw_playing);
}
