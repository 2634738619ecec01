//! SQLite-backed vector store.
//!
//! In-process store using SQLite for chunk rows and brute-force cosine
//! similarity for search. Selected with `VECTOR_DB_TYPE=chroma`; the file
//! lives under `CHROMA_PERSIST_DIR`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{cosine_similarity, ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::errors::ApiError;

const DB_FILENAME: &str = "vectors.db";

pub struct LocalVectorStore {
    pool: SqlitePool,
}

impl LocalVectorStore {
    pub async fn new(persist_dir: &Path) -> Result<Self, ApiError> {
        std::fs::create_dir_all(persist_dir).map_err(ApiError::internal)?;
        let db_path = persist_dir.join(DB_FILENAME);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kb_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_str: Option<String> = row.get("metadata");
        let metadata = metadata_str.and_then(|raw| serde_json::from_str::<Value>(&raw).ok());

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source: row.get("source"),
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = chunk
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(ApiError::internal)?
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO kb_chunks (chunk_id, content, source, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, source, metadata, embedding
             FROM kb_chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ChunkSearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(query_embedding, &stored_emb);

                Some(ChunkSearchResult {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<usize, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut deleted = 0;

        for chunk_id in chunk_ids {
            let result = sqlx::query("DELETE FROM kb_chunks WHERE chunk_id = ?1")
                .bind(chunk_id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
            deleted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(deleted)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kb_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(id: &str, content: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            source: "faq.md".to_string(),
            metadata: Some(json!({"chunk_index": 0})),
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path()).await.expect("store");

        store
            .upsert(vec![
                (chunk("a", "shipping times"), vec![1.0, 0.0]),
                (chunk("b", "refund policy"), vec![0.0, 1.0]),
                (chunk("c", "express shipping"), vec![0.9, 0.1]),
            ])
            .await
            .expect("upsert");

        let results = store.search(&[1.0, 0.0], 2).await.expect("search");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk_id, "a");
        assert_eq!(results[1].chunk.chunk_id, "c");
        assert_eq!(results[0].chunk.metadata, Some(json!({"chunk_index": 0})));
    }

    #[tokio::test]
    async fn zero_limit_returns_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path()).await.expect("store");
        store
            .upsert(vec![(chunk("a", "shipping times"), vec![1.0, 0.0])])
            .await
            .expect("upsert");

        let results = store.search(&[1.0, 0.0], 0).await.expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path()).await.expect("store");

        store
            .upsert(vec![(chunk("a", "old"), vec![1.0, 0.0])])
            .await
            .expect("upsert");
        store
            .upsert(vec![(chunk("a", "new"), vec![1.0, 0.0])])
            .await
            .expect("upsert");
        assert_eq!(store.count().await.expect("count"), 1);

        let results = store.search(&[1.0, 0.0], 5).await.expect("search");
        assert_eq!(results[0].chunk.content, "new");

        let deleted = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .expect("delete");
        assert_eq!(deleted, 1);
        assert_eq!(store.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = LocalVectorStore::new(dir.path()).await.expect("store");
            store
                .upsert(vec![(chunk("a", "kept"), vec![0.5, 0.5])])
                .await
                .expect("upsert");
        }

        let reopened = LocalVectorStore::new(dir.path()).await.expect("store");
        assert_eq!(reopened.count().await.expect("count"), 1);
        assert!(dir.path().join(DB_FILENAME).exists());
    }
}
