use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{check_len, ApiJson, ApiQuery};
use crate::core::errors::ApiError;
use crate::rag::NewDocumentUpload;
use crate::state::AppState;

const MAX_FILE_TYPE_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct DocumentListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<NewDocumentUpload>,
) -> Result<impl IntoResponse, ApiError> {
    check_len("file_type", payload.file_type.as_deref(), MAX_FILE_TYPE_CHARS)?;
    let document = state.ingestor.ingest(payload).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<DocumentListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.documents.list(params.limit, params.offset).await?;
    Ok(Json(json!({ "documents": documents })))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .documents
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document {} not found", id)))?;
    Ok(Json(document))
}
