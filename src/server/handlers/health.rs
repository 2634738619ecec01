use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "app": state.settings.app_name,
        "version": state.settings.app_version
    }))
}

pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // An unreachable index only blanks the count.
    let vectors = match state.vector_store.count().await {
        Ok(count) => Some(count),
        Err(err) => {
            tracing::warn!(error = %err, "vector_count_failed");
            None
        }
    };

    Json(json!({
        "app": state.settings.app_name,
        "version": state.settings.app_version,
        "health": "/health",
        "knowledge_base": {
            "backend": state.vector_store.name(),
            "vectors": vectors
        },
        "endpoints": {
            "chat": "POST /api/v1/chat",
            "history": "GET /api/v1/chat/{session_id}/history",
            "webhook": "POST /webhook/message",
            "audit": "GET /api/v1/audit",
            "audit_stats": "GET /api/v1/audit/stats",
            "ticket": "POST /api/v1/ticket",
            "documents": "POST /api/v1/documents"
        }
    }))
}
