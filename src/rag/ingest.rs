use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::chunking::chunk_text;
use super::store::{StoredChunk, VectorStore};
use crate::core::config::{Settings, StorageType};
use crate::core::errors::ApiError;
use crate::db::documents::{Document, NewDocument};
use crate::db::DocumentStore;
use crate::llm::LlmProvider;

const EMBED_BATCH_SIZE: usize = 64;

/// A knowledge-base document submitted for ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocumentUpload {
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Stores uploaded documents and indexes their chunks in the vector store.
#[derive(Clone)]
pub struct Ingestor {
    documents: DocumentStore,
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    storage_type: StorageType,
    storage_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Ingestor {
    pub fn new(
        documents: DocumentStore,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            documents,
            llm,
            store,
            storage_type: settings.storage_type,
            storage_dir: settings.local_storage_path.clone(),
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }

    /// Ingest one document.
    ///
    /// Validation and storage problems are returned as errors. Once the
    /// document row exists, indexing failures are recorded on the row and
    /// the `failed` document is returned.
    pub async fn ingest(&self, upload: NewDocumentUpload) -> Result<Document, ApiError> {
        if self.storage_type == StorageType::Minio {
            return Err(ApiError::ServiceUnavailable(
                "MinIO document storage is not supported; use STORAGE_TYPE=local".to_string(),
            ));
        }
        if upload.content.trim().is_empty() {
            return Err(ApiError::BadRequest("Document content is empty".to_string()));
        }
        let filename = sanitize_filename(&upload.filename)?;

        let document_id = Uuid::new_v4().to_string();
        let file_path = self
            .write_file(&document_id, &filename, &upload.content)
            .await?;

        let document = self
            .documents
            .create(NewDocument {
                id: Some(document_id.clone()),
                filename: filename.clone(),
                file_path: Some(file_path.to_string_lossy().into_owned()),
                file_type: upload.file_type.clone().or_else(|| guess_file_type(&filename)),
                file_size: Some(upload.content.len() as i64),
                metadata: upload.metadata.clone(),
            })
            .await?;

        self.documents.mark_processing(&document.id).await?;

        let mut embedding_ids = Vec::new();
        match self
            .index(&document.id, &filename, &upload.content, &mut embedding_ids)
            .await
        {
            Ok(()) => {
                let processed = self
                    .documents
                    .mark_processed(&document.id, &embedding_ids)
                    .await?;
                tracing::info!(
                    document_id = %processed.id,
                    filename = %processed.filename,
                    chunk_count = processed.chunk_count,
                    "document_processed"
                );
                Ok(processed)
            }
            Err(err) => {
                tracing::warn!(
                    document_id = %document.id,
                    filename = %filename,
                    error = %err,
                    "document_processing_failed"
                );
                self.discard_vectors(&document.id, &embedding_ids).await;
                self.documents
                    .mark_failed(&document.id, &err.to_string())
                    .await
            }
        }
    }

    /// Removes vectors of a failed document so they never reach retrieval.
    async fn discard_vectors(&self, document_id: &str, embedding_ids: &[String]) {
        if embedding_ids.is_empty() {
            return;
        }
        match self.store.delete(embedding_ids).await {
            Ok(deleted) => tracing::info!(
                document_id = %document_id,
                deleted,
                "document_vectors_discarded"
            ),
            Err(err) => tracing::error!(
                document_id = %document_id,
                error = %err,
                "document_vectors_discard_failed"
            ),
        }
    }

    async fn write_file(
        &self,
        document_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, ApiError> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(ApiError::internal)?;

        let path = self
            .storage_dir
            .join(format!("{}_{}", document_id, filename));
        tokio::fs::write(&path, content)
            .await
            .map_err(ApiError::internal)?;

        Ok(path)
    }

    async fn index(
        &self,
        document_id: &str,
        filename: &str,
        content: &str,
        embedding_ids: &mut Vec<String>,
    ) -> Result<(), ApiError> {
        let chunks = chunk_text(content, self.chunk_size, self.chunk_overlap);
        embedding_ids.reserve(chunks.len());

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self.llm.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(ApiError::Internal(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            let items: Vec<(StoredChunk, Vec<f32>)> = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    let stored = StoredChunk {
                        chunk_id: format!("{}-{}", document_id, chunk.chunk_index),
                        content: chunk.text.clone(),
                        source: filename.to_string(),
                        metadata: Some(json!({
                            "document_id": document_id,
                            "filename": filename,
                            "chunk_index": chunk.chunk_index,
                        })),
                    };
                    (stored, embedding)
                })
                .collect();

            // Recorded before the upsert so a partial write is still cleaned up.
            embedding_ids.extend(items.iter().map(|(chunk, _)| chunk.chunk_id.clone()));
            self.store.upsert(items).await?;
        }

        Ok(())
    }
}

/// Keeps only the final path component of a client-supplied name.
fn sanitize_filename(raw: &str) -> Result<String, ApiError> {
    let name = Path::new(raw.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::trim)
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(ApiError::BadRequest("A valid filename is required".to_string()));
    }
    if name.chars().count() > 255 {
        return Err(ApiError::BadRequest(
            "filename must be at most 255 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn guess_file_type(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
