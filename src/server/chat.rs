use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::events::ServerEvent;
use crate::storage::ChatMessage;

const DEFAULT_CHAT_LIMIT: i64 = 50;
const MAX_CHAT_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct ChatParams {
    limit: Option<i64>,
}

/// Newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let limit = params.limit.unwrap_or(DEFAULT_CHAT_LIMIT).min(MAX_CHAT_LIMIT);
    Ok(Json(state.store.fetch_chat_messages(limit).await?))
}

#[derive(Deserialize)]
pub struct ChatInput {
    role: String,
    content: String,
}

pub async fn add_message(
    State(state): State<AppState>,
    Json(input): Json<ChatInput>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let role = input.role.trim();
    if role.is_empty() || input.content.trim().is_empty() {
        return Err(ApiError::BadRequest("role and content are required".into()));
    }

    let message = state.store.insert_chat_message(role, &input.content).await?;
    state
        .events
        .publish(ServerEvent::chat(&message.role, &message.content));
    Ok((StatusCode::CREATED, Json(message)))
}
