use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::{
    from_db_json, from_db_time, from_db_time_opt, parse_label, sanitize_limit, sanitize_offset,
    to_db_json, to_db_time,
};
use crate::core::errors::ApiError;
use crate::types::DocumentStatus;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

const DOCUMENT_COLUMNS: &str = "id, filename, file_path, file_type, file_size, chunk_count, \
    embedding_ids, status, error_message, created_at, processed_at, metadata";

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Option<String>,
    pub filename: String,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub chunk_count: i64,
    pub embedding_ids: Vec<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

/// Metadata rows for ingested knowledge-base files.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: AnyPool,
}

impl DocumentStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_document: NewDocument) -> Result<Document, ApiError> {
        let document = Document {
            id: new_document
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            filename: new_document.filename,
            file_path: new_document.file_path,
            file_type: new_document.file_type,
            file_size: new_document.file_size,
            chunk_count: 0,
            embedding_ids: Vec::new(),
            status: DocumentStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            processed_at: None,
            metadata: new_document.metadata,
        };

        let sql = format!(
            "INSERT INTO documents ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            DOCUMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&document.id)
            .bind(&document.filename)
            .bind(document.file_path.clone())
            .bind(document.file_type.clone())
            .bind(document.file_size)
            .bind(document.chunk_count)
            .bind(encode_ids(&document.embedding_ids)?)
            .bind(document.status.as_str())
            .bind(document.error_message.clone())
            .bind(to_db_time(&document.created_at))
            .bind(document.processed_at.as_ref().map(to_db_time))
            .bind(to_db_json(&document.metadata)?)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(document)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, ApiError> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(document_from_row).transpose()
    }

    pub async fn list(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Document>, ApiError> {
        let sql = format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(sanitize_limit(limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE))
            .bind(sanitize_offset(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        rows.iter().map(document_from_row).collect()
    }

    pub async fn mark_processing(&self, id: &str) -> Result<(), ApiError> {
        self.set_status(id, DocumentStatus::Processing, None).await
    }

    pub async fn mark_processed(
        &self,
        id: &str,
        embedding_ids: &[String],
    ) -> Result<Document, ApiError> {
        let result = sqlx::query(
            "\
            UPDATE documents
            SET status = $1, chunk_count = $2, embedding_ids = $3, error_message = NULL,
                processed_at = $4
            WHERE id = $5",
        )
        .bind(DocumentStatus::Processed.as_str())
        .bind(embedding_ids.len() as i64)
        .bind(encode_ids(embedding_ids)?)
        .bind(to_db_time(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Document {} not found", id)));
        }
        self.require(id).await
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<Document, ApiError> {
        self.set_status(id, DocumentStatus::Failed, Some(error)).await?;
        self.require(id).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), ApiError> {
        let result =
            sqlx::query("UPDATE documents SET status = $1, error_message = $2 WHERE id = $3")
                .bind(status.as_str())
                .bind(error.map(str::to_string))
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Document {} not found", id)));
        }
        Ok(())
    }

    async fn require(&self, id: &str) -> Result<Document, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Document {} not found", id)))
    }
}

fn encode_ids(ids: &[String]) -> Result<String, ApiError> {
    serde_json::to_string(ids).map_err(ApiError::internal)
}

fn document_from_row(row: &AnyRow) -> Result<Document, ApiError> {
    let status: String = row.try_get("status").map_err(ApiError::internal)?;
    let created_at: String = row.try_get("created_at").map_err(ApiError::internal)?;
    let embedding_ids = from_db_json(row.try_get("embedding_ids").map_err(ApiError::internal)?)
        .and_then(|value| serde_json::from_value::<Vec<String>>(value).ok())
        .unwrap_or_default();

    Ok(Document {
        id: row.try_get("id").map_err(ApiError::internal)?,
        filename: row.try_get("filename").map_err(ApiError::internal)?,
        file_path: row.try_get("file_path").map_err(ApiError::internal)?,
        file_type: row.try_get("file_type").map_err(ApiError::internal)?,
        file_size: row.try_get("file_size").map_err(ApiError::internal)?,
        chunk_count: row.try_get("chunk_count").map_err(ApiError::internal)?,
        embedding_ids,
        status: parse_label(&status)?,
        error_message: row.try_get("error_message").map_err(ApiError::internal)?,
        created_at: from_db_time(&created_at)?,
        processed_at: from_db_time_opt(row.try_get("processed_at").map_err(ApiError::internal)?)?,
        metadata: from_db_json(row.try_get("metadata").map_err(ApiError::internal)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn upload(name: &str) -> NewDocument {
        NewDocument {
            id: None,
            filename: name.to_string(),
            file_path: Some(format!("/tmp/{name}")),
            file_type: Some("text/markdown".to_string()),
            file_size: Some(128),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn lifecycle_pending_to_processed() {
        let store = Database::in_memory().await.expect("database").documents();
        let created = store.create(upload("faq.md")).await.expect("create");
        assert_eq!(created.status, DocumentStatus::Pending);
        assert_eq!(created.chunk_count, 0);

        store.mark_processing(&created.id).await.expect("processing");
        let ids = vec!["faq-0".to_string(), "faq-1".to_string()];
        let processed = store.mark_processed(&created.id, &ids).await.expect("processed");

        assert_eq!(processed.status, DocumentStatus::Processed);
        assert_eq!(processed.chunk_count, 2);
        assert_eq!(processed.embedding_ids, ids);
        assert!(processed.processed_at.is_some());
    }

    #[tokio::test]
    async fn failure_records_error_message() {
        let store = Database::in_memory().await.expect("database").documents();
        let created = store.create(upload("broken.pdf")).await.expect("create");

        let failed = store
            .mark_failed(&created.id, "embedding service unavailable")
            .await
            .expect("failed");

        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("embedding service unavailable")
        );
        assert_eq!(failed.processed_at, None);
    }

    #[tokio::test]
    async fn marking_unknown_document_is_not_found() {
        let store = Database::in_memory().await.expect("database").documents();
        let err = store.mark_processing("nope").await.expect_err("missing");
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
