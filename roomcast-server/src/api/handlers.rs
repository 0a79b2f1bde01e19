//! Request handlers

use crate::api::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use roomcast_common::model::{PlayMode, Room};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub mode: Option<PlayMode>,
    pub creator_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DestroyRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub delay_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub user_id: Uuid,
    pub ratio: f64,
}

#[derive(Debug, Deserialize)]
pub struct AddTracksRequest {
    pub user_id: Uuid,
    pub track_ids: Vec<String>,
}

/// Load the room and require the acting user to be creator or admin
async fn require_admin(state: &AppState, room_id: Uuid, user_id: Uuid) -> Result<Room> {
    let room = state.rooms.get(room_id).await?;
    if !room.is_admin(user_id) {
        return Err(Error::Validation("admin privileges required".into()));
    }
    Ok(room)
}

// ---- room management ----

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<Room>> {
    if req.name.trim().is_empty() {
        return Err(Error::Validation("room name must not be empty".into()));
    }
    let room = Room::new(
        req.name.trim(),
        req.mode.unwrap_or(PlayMode::Demand),
        req.creator_id,
    );
    state.rooms.save(&room).await?;
    state.lifecycle.ensure_routines(&room).await?;
    state.runtime.join_room(room.id, req.creator_id);
    info!("Created room {} ({})", room.id, room.name);
    Ok(Json(room))
}

pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Value>> {
    let mut summaries = Vec::new();
    for room_id in state.rooms.list_ids().await? {
        if let Some(room) = state.rooms.load(room_id).await? {
            summaries.push(json!({
                "id": room.id,
                "name": room.name,
                "status": room.status,
                "mode": room.mode,
                "online_count": state.runtime.online_count(room.id),
            }));
        }
    }
    Ok(Json(json!({ "rooms": summaries })))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Room>> {
    Ok(Json(state.rooms.get(room_id).await?))
}

pub async fn destroy_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<DestroyRequest>,
) -> Result<Json<Value>> {
    require_admin(&state, room_id, req.user_id).await?;
    let delay = req
        .delay_seconds
        .unwrap_or_else(|| state.lifecycle.default_destroy_delay());
    state.lifecycle.destroy(room_id, delay).await?;
    Ok(Json(json!({ "will_destroy_in_seconds": delay })))
}

pub async fn cancel_destroy(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<Json<Value>> {
    require_admin(&state, room_id, req.user_id).await?;
    let canceled = state.lifecycle.cancel_destroy(room_id).await?;
    Ok(Json(json!({ "canceled": canceled })))
}

pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<StatusCode> {
    // Room must exist before membership is recorded
    state.rooms.get(room_id).await?;
    state.runtime.join_room(room_id, req.user_id);
    // A returning creator rescues a room under countdown
    state
        .lifecycle
        .on_creator_reconnect(room_id, req.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<StatusCode> {
    state.runtime.leave_room(room_id, req.user_id);
    Ok(StatusCode::NO_CONTENT)
}

// ---- playback control ----

pub async fn play(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<StatusCode> {
    require_admin(&state, room_id, req.user_id).await?;
    state.playback.start_playing(room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<StatusCode> {
    require_admin(&state, room_id, req.user_id).await?;
    state.playback.pause_playing(room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn seek(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<Value>> {
    require_admin(&state, room_id, req.user_id).await?;
    let end_at = state.playback.change_progress(room_id, req.ratio).await?;
    Ok(Json(json!({ "end_at_epoch_seconds": end_at })))
}

pub async fn skip(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<StatusCode> {
    require_admin(&state, room_id, req.user_id).await?;
    state.playback.skip(room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn vote_skip(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> Result<Json<Value>> {
    let (votes, needed) = state.playback.vote_skip(room_id, req.user_id).await?;
    Ok(Json(json!({ "votes": votes, "needed": needed })))
}

// ---- queue management ----

pub async fn add_tracks(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<AddTracksRequest>,
) -> Result<Json<Value>> {
    if req.track_ids.is_empty() {
        return Err(Error::Validation("track_ids must not be empty".into()));
    }
    let added = state.playback.add_tracks(room_id, &req.track_ids).await?;
    Ok(Json(json!({ "added": added })))
}

pub async fn remove_track(
    State(state): State<AppState>,
    Path((room_id, index)): Path<(Uuid, usize)>,
) -> Result<StatusCode> {
    state.playback.remove_track(room_id, index).await?;
    Ok(StatusCode::NO_CONTENT)
}
