use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{parse_label_param, ApiQuery};
use crate::core::errors::ApiError;
use crate::db::audit::AuditQuery;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditListParams {
    pub session_id: Option<String>,
    pub intent: Option<String>,
    pub message_type: Option<String>,
    /// RFC 3339 lower bound on `created_at`.
    pub since: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<AuditListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let since = params
        .since
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ApiError::BadRequest(format!("invalid since: {}", e)))
        })
        .transpose()?;

    let query = AuditQuery {
        session_id: params.session_id.filter(|s| !s.trim().is_empty()),
        intent: parse_label_param("intent", params.intent.as_deref())?,
        message_type: parse_label_param("message_type", params.message_type.as_deref())?,
        since,
        limit: params.limit,
        offset: params.offset,
    };

    let page = state.audit.list(query).await?;
    Ok(Json(page))
}

pub async fn audit_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.audit.stats().await?;
    Ok(Json(stats))
}

pub async fn get_audit_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .audit
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Audit log {} not found", id)))?;
    Ok(Json(entry))
}
