//! Test helpers for roomcast-server integration tests
//!
//! Provides a fully wired service graph over the in-memory store plus a
//! small request helper for exercising the router in process.

// Not every test binary uses every helper
#![allow(dead_code)]

use axum::body::Body;
use axum::http::StatusCode;
use http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use roomcast_common::model::{PlayMode, Room, TrackDetail};
use roomcast_server::api::{create_router, AppState};
use roomcast_server::bootstrap::{self, App};
use roomcast_server::lifecycle::RoutinePeriods;
use roomcast_server::provider::StaticTrackProvider;
use roomcast_server::store::{KvStore, MemoryStore};

/// A wired service graph plus the store it runs over
pub struct TestApp {
    pub app: App,
    pub store: Arc<dyn KvStore>,
}

/// Build the full graph over a fresh in-memory store, with task handlers
/// registered and persisted timers replayed.
pub async fn test_app(provider: StaticTrackProvider, destroy_delay: f64) -> TestApp {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    test_app_on(Arc::clone(&store), provider, destroy_delay).await
}

/// Same, but over a caller-supplied store (for restart scenarios)
pub async fn test_app_on(
    store: Arc<dyn KvStore>,
    provider: StaticTrackProvider,
    destroy_delay: f64,
) -> TestApp {
    let app = bootstrap::build(
        Arc::clone(&store),
        Arc::new(provider),
        RoutinePeriods::default(),
        destroy_delay,
    );
    bootstrap::start(&app).await.expect("bootstrap failed");
    TestApp { app, store }
}

/// Track detail with fixed metadata for the static provider
pub fn track(id: &str, duration_seconds: f64) -> TrackDetail {
    TrackDetail {
        id: id.to_string(),
        name: format!("name-{}", id),
        artist: "artist".to_string(),
        duration_seconds,
        src: format!("https://cdn.example/{}.mp3", id),
        lyric: None,
        pic: None,
        comment: None,
    }
}

/// Persist a demand-mode room with its routines armed
pub async fn make_room(tapp: &TestApp, creator_id: Uuid) -> Room {
    let room = Room::new("integration", PlayMode::Demand, creator_id);
    tapp.app.rooms.save(&room).await.expect("save room");
    tapp.app
        .lifecycle
        .ensure_routines(&room)
        .await
        .expect("ensure routines");
    room
}

/// Router bound to the test graph
pub fn router(tapp: &TestApp) -> axum::Router {
    create_router(AppState {
        rooms: tapp.app.rooms.clone(),
        playback: Arc::clone(&tapp.app.playback),
        lifecycle: Arc::clone(&tapp.app.lifecycle),
        runtime: Arc::clone(&tapp.app.runtime),
        port: 5750,
    })
}

/// One in-process request; returns status and any JSON body
pub async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let mut builder = Request::builder().method(method).uri(path);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).ok();
    (status, json)
}
