//! Server-Sent Events stream
//!
//! One stream per (user, room). Opening a stream marks the user connected;
//! dropping it (client disconnect) marks them disconnected, which is what
//! the creator-liveness routine observes. When the room is destroyed the
//! server ends the stream after the final `RoomDestroyed` event.

use crate::api::AppState;
use crate::error::Result;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use roomcast_common::events::RoomEvent;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::runtime::RuntimeDirectory;

#[derive(Debug, Deserialize)]
pub struct EventStreamQuery {
    pub user_id: Uuid,
}

/// Marks the user disconnected when the stream is dropped
struct ConnectionGuard {
    runtime: Arc<RuntimeDirectory>,
    user_id: Uuid,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!("SSE stream for user {} closed", self.user_id);
        self.runtime.disconnect(self.user_id);
    }
}

pub async fn event_stream(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<EventStreamQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    // Room must exist; a stream against a destroyed room 404s
    state.rooms.get(room_id).await?;

    let user_id = query.user_id;
    info!("New SSE client: user {} in room {}", user_id, room_id);
    state.runtime.connect(user_id);

    let mut rx = state.runtime.subscribe();
    let guard = ConnectionGuard {
        runtime: Arc::clone(&state.runtime),
        user_id,
    };

    let stream = async_stream::stream! {
        // Owned by the stream so disconnect fires when the client goes away
        let _guard = guard;

        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if !envelope.scope.covers(user_id, room_id) {
                        continue;
                    }
                    let room_gone = matches!(
                        &envelope.event,
                        RoomEvent::RoomDestroyed { room_id: id, .. } if *id == room_id
                    );
                    match Event::default()
                        .event(envelope.event.name())
                        .json_data(&envelope.event)
                    {
                        Ok(event) => yield Ok(event),
                        Err(e) => {
                            debug!("SSE: failed to encode event: {}", e);
                        }
                    }
                    // Destruction is final: close the stream server-side
                    // instead of leaving the client to time out
                    if room_gone {
                        break;
                    }
                }
                // Slow consumer: skip what was missed, keep streaming
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    debug!("SSE: user {} lagged by {} events", user_id, n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}
