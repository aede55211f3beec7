//! REST endpoints for managing chat rooms. Traffic inside a room flows over
//! the WebSocket gateway.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::chat::room::RoomSummary;
use crate::error::ApiError;
use crate::AppState;

const MAX_ROOM_NAME_LEN: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}", get(get_room).delete(delete_room))
}

async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomSummary>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Room name must not be empty"));
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Room name must be at most {MAX_ROOM_NAME_LEN} characters"
        )));
    }

    let room = state.chat.create_room(name);
    Ok((StatusCode::CREATED, Json(room.summary())))
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.chat.list_rooms())
}

async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSummary>, ApiError> {
    state
        .chat
        .get_room(&room_id)
        .map(|room| Json(room.summary()))
        .ok_or_else(|| ApiError::not_found("Room not found"))
}

async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .chat
        .remove_room(&room_id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiError::not_found("Room not found"))
}
