use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{ApiJson, ApiQuery};
use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;
use crate::support::IncomingMessage;
use crate::types::MessageType;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<IncomingMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state.pipeline.handle(payload, MessageType::Chat).await?;
    Ok(Json(reply))
}

/// Entry point for the n8n workflow engine.
pub async fn webhook_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<IncomingMessage>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.webhook_key)?;
    let reply = state.pipeline.handle(payload, MessageType::Webhook).await?;
    Ok(Json(reply))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(state.settings.memory_window);
    let turns = state.memory.recent(&session_id, limit, Utc::now()).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "messages": turns
    })))
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.memory.clear(&session_id).await?;
    tracing::info!(session_id = %session_id, deleted, "memory_cleared");
    Ok(Json(json!({
        "session_id": session_id,
        "deleted": deleted
    })))
}
