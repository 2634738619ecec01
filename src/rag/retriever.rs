use std::sync::Arc;

use serde::Serialize;

use super::store::{ChunkSearchResult, VectorStore};
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

/// A knowledge snippet handed to the prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSource {
    pub chunk_id: String,
    pub source: String,
    pub content: String,
    pub score: f32,
}

impl From<ChunkSearchResult> for RetrievedSource {
    fn from(result: ChunkSearchResult) -> Self {
        Self {
            chunk_id: result.chunk.chunk_id,
            source: result.chunk.source,
            content: result.chunk.content,
            score: result.score,
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    threshold: f32,
}

impl Retriever {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
        threshold: f32,
    ) -> Self {
        Self {
            llm,
            store,
            top_k,
            threshold,
        }
    }

    /// Knowledge snippets relevant to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedSource>, ApiError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.llm.embed(&[query.to_string()]).await?;
        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("no embedding returned for query".to_string()))?;

        let results = self.store.search(&embedding, self.top_k).await?;
        Ok(filter_by_threshold(results, self.threshold, self.top_k))
    }
}

fn filter_by_threshold(
    mut results: Vec<ChunkSearchResult>,
    threshold: f32,
    top_k: usize,
) -> Vec<RetrievedSource> {
    results.retain(|result| result.score >= threshold);
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results.into_iter().map(RetrievedSource::from).collect()
}
