//! Integration tests for the roomcast HTTP API
//!
//! Exercises the router in process: room management, admin gating, queue
//! and playback endpoints, and the error-to-status mapping.

mod helpers;

use helpers::{make_request, router, test_app, track};
use http::Method;
use axum::http::StatusCode;
use roomcast_server::provider::StaticTrackProvider;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_check() {
    let tapp = test_app(StaticTrackProvider::new(), 300.0).await;
    let app = router(&tapp);

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["status"], "ok");
}

#[tokio::test]
async fn test_create_then_get_room() {
    let tapp = test_app(StaticTrackProvider::new(), 300.0).await;
    let app = router(&tapp);
    let creator = Uuid::new_v4();

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms",
        Some(json!({ "name": "  late night  ", "creator_id": creator })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["name"], "late night");
    let room_id = body["id"].as_str().unwrap().to_string();

    let (status, body) =
        make_request(&app, Method::GET, &format!("/api/v1/rooms/{}", room_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["creator_id"], json!(creator));
}

#[tokio::test]
async fn test_create_room_rejects_blank_name() {
    let tapp = test_app(StaticTrackProvider::new(), 300.0).await;
    let app = router(&tapp);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms",
        Some(json!({ "name": "   ", "creator_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_room_is_404() {
    let tapp = test_app(StaticTrackProvider::new(), 300.0).await;
    let app = router(&tapp);

    let (status, _) = make_request(
        &app,
        Method::GET,
        &format!("/api/v1/rooms/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_destroy_requires_admin() {
    let tapp = test_app(StaticTrackProvider::new(), 300.0).await;
    let app = router(&tapp);
    let creator = Uuid::new_v4();
    let room = helpers::make_room(&tapp, creator).await;

    let (status, _) = make_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/rooms/{}", room.id),
        Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = make_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/rooms/{}", room.id),
        Some(json!({ "user_id": creator, "delay_seconds": 120.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["will_destroy_in_seconds"], 120.0);

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/destroy/cancel", room.id),
        Some(json!({ "user_id": creator })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["canceled"], true);
}

#[tokio::test]
async fn test_queue_and_playback_endpoints() {
    let provider = StaticTrackProvider::new()
        .with_track(track("t1", 200.0))
        .with_track(track("t2", 100.0));
    let tapp = test_app(provider, 300.0).await;
    let app = router(&tapp);
    let creator = Uuid::new_v4();
    let room = helpers::make_room(&tapp, creator).await;

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/queue", room.id),
        Some(json!({ "user_id": creator, "track_ids": ["t1", "t2"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["added"], 2);

    // The head auto-started; pause and seek as the admin
    let (status, _) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/playback/pause", room.id),
        Some(json!({ "user_id": creator })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/playback/seek", room.id),
        Some(json!({ "user_id": creator, "ratio": 0.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // Paused seek arms nothing and reports no end time
    assert_eq!(body.unwrap()["end_at_epoch_seconds"], json!(null));

    let (status, _) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/playback/seek", room.id),
        Some(json!({ "user_id": creator, "ratio": 1.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/playback/skip", room.id),
        Some(json!({ "user_id": creator })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let loaded = tapp.app.rooms.get(room.id).await.unwrap();
    assert_eq!(loaded.now_playing.unwrap().track_id, "t2");
}

#[tokio::test]
async fn test_skip_vote_reports_tally() {
    let provider = StaticTrackProvider::new().with_track(track("t1", 200.0));
    let tapp = test_app(provider, 300.0).await;
    let app = router(&tapp);
    let creator = Uuid::new_v4();
    let room = helpers::make_room(&tapp, creator).await;

    for _ in 0..4 {
        tapp.app.runtime.join_room(room.id, Uuid::new_v4());
    }
    tapp.app
        .playback
        .add_tracks(room.id, &["t1".to_string()])
        .await
        .unwrap();

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/playback/skip-vote", room.id),
        Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["votes"], 1);
    assert_eq!(body["needed"], 2);
}

#[tokio::test]
async fn test_join_requires_existing_room() {
    let tapp = test_app(StaticTrackProvider::new(), 300.0).await;
    let app = router(&tapp);

    let (status, _) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/rooms/{}/join", Uuid::new_v4()),
        Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
