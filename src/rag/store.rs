//! Vector store abstraction for knowledge-base backends.
//!
//! `LocalVectorStore` keeps vectors in an on-disk SQLite file,
//! `PineconeStore` talks to a hosted Pinecone index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// A knowledge-base chunk as stored next to its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier, also the vector id.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Source identifier (usually the document filename).
    pub source: String,
    /// Optional metadata (JSON).
    pub metadata: Option<Value>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace chunks with their embedding vectors.
    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError>;

    /// Chunks most similar to the query embedding, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Delete chunks by id, returning how many were removed when known.
    async fn delete(&self, chunk_ids: &[String]) -> Result<usize, ApiError>;

    /// Total number of stored vectors.
    async fn count(&self) -> Result<usize, ApiError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
