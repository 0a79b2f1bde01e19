//! REST + SSE surface for roomcast
//!
//! Thin layer: handlers validate, delegate to the playback and lifecycle
//! services, and map the error taxonomy onto HTTP statuses. Conflicts are a
//! structured 409 "try again", not a failure.

pub mod handlers;
pub mod sse;

use crate::error::Error;
use crate::lifecycle::Lifecycle;
use crate::playback::Playback;
use crate::rooms::RoomStore;
use crate::runtime::RuntimeDirectory;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomStore,
    pub playback: Arc<Playback>,
    pub lifecycle: Arc<Lifecycle>,
    pub runtime: Arc<RuntimeDirectory>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Room management
                .route("/rooms", post(handlers::create_room))
                .route("/rooms", get(handlers::list_rooms))
                .route("/rooms/:room_id", get(handlers::get_room))
                .route("/rooms/:room_id", delete(handlers::destroy_room))
                .route("/rooms/:room_id/destroy/cancel", post(handlers::cancel_destroy))
                .route("/rooms/:room_id/join", post(handlers::join_room))
                .route("/rooms/:room_id/leave", post(handlers::leave_room))
                // Playback control
                .route("/rooms/:room_id/playback/play", post(handlers::play))
                .route("/rooms/:room_id/playback/pause", post(handlers::pause))
                .route("/rooms/:room_id/playback/seek", post(handlers::seek))
                .route("/rooms/:room_id/playback/skip", post(handlers::skip))
                .route("/rooms/:room_id/playback/skip-vote", post(handlers::vote_skip))
                // Queue management
                .route("/rooms/:room_id/queue", post(handlers::add_tracks))
                .route("/rooms/:room_id/queue/:index", delete(handlers::remove_track))
                // SSE events
                .route("/rooms/:room_id/events", get(sse::event_stream)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "roomcast-server",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::PlaybackNotLoaded => {
                (StatusCode::BAD_REQUEST, "no track loaded".to_string())
            }
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Internal detail stays in the log, not the response
            other => {
                error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
