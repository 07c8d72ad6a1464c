//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use chatline_shared::protocol::{LastReadPayload, MessagePagePayload, UnreadCountPayload};

use crate::{ui::state::AppState, usecase::UseCaseError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub size: Option<usize>,
    pub before_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadQuery {
    pub user_id: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /api/rooms/{room_id}/messages?size=&beforeId=`
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<u64>,
    Query(query): Query<HistoryQuery>,
) -> Json<MessagePagePayload> {
    let page = state
        .fetch_history_usecase
        .execute(room_id, query.before_id, query.size)
        .await;
    Json(page.into())
}

/// `PUT /api/rooms/{room_id}/last-read` with `{ userId, messageId }`
pub async fn put_last_read(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<u64>,
    Json(body): Json<LastReadPayload>,
) -> StatusCode {
    match state
        .read_state_usecase
        .mark_read(room_id, body.user_id, body.message_id)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::warn!("Rejected last-read update for room {}: {}", room_id, e);
            status_of(&e)
        }
    }
}

/// `GET /api/rooms/{room_id}/unread?userId=`
pub async fn get_unread(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<u64>,
    Query(query): Query<UnreadQuery>,
) -> Result<Json<UnreadCountPayload>, StatusCode> {
    let count = state
        .read_state_usecase
        .unread_count(room_id, query.user_id)
        .await
        .map_err(|e| status_of(&e))?;
    Ok(Json(UnreadCountPayload { room_id, count }))
}

fn status_of(error: &UseCaseError) -> StatusCode {
    match error {
        UseCaseError::Value(_) => StatusCode::BAD_REQUEST,
        UseCaseError::Repository(_) => StatusCode::NOT_FOUND,
    }
}
