use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use super::store::{ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::config::Settings;
use crate::core::errors::ApiError;

/// Pinecone data-plane client.
///
/// Chunk text and source travel inside the vector metadata under the
/// `content` and `source` keys so search results can be rebuilt without a
/// second lookup.
pub struct PineconeStore {
    host: String,
    api_key: String,
    client: Client,
}

impl PineconeStore {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let host = settings
            .pinecone_index_host
            .as_deref()
            .ok_or_else(|| {
                ApiError::ServiceUnavailable("PINECONE_INDEX_HOST is not configured".to_string())
            })?;
        if settings.pinecone_api_key.trim().is_empty() {
            return Err(ApiError::ServiceUnavailable(
                "PINECONE_API_KEY is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            host: normalize_host(host),
            api_key: settings.pinecone_api_key.clone(),
            client,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.host, path);
        let res = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Pinecone {} error ({}): {}",
                path, status, text
            )));
        }

        res.json().await.map_err(ApiError::internal)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let vectors: Vec<Value> = items
            .iter()
            .map(|(chunk, values)| upsert_vector(chunk, values))
            .collect();

        self.post("/vectors/upsert", json!({ "vectors": vectors }))
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let body = json!({
            "vector": query_embedding,
            "topK": limit,
            "includeMetadata": true,
        });

        let payload = self.post("/query", body).await?;
        parse_query_response(&payload)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<usize, ApiError> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }

        self.post("/vectors/delete", json!({ "ids": chunk_ids }))
            .await?;
        // The delete endpoint does not report how many ids existed.
        Ok(chunk_ids.len())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let payload = self.post("/describe_index_stats", json!({})).await?;
        Ok(parse_vector_count(&payload))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn upsert_vector(chunk: &StoredChunk, values: &[f32]) -> Value {
    let mut metadata = match &chunk.metadata {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    metadata.insert("content".to_string(), json!(chunk.content));
    metadata.insert("source".to_string(), json!(chunk.source));

    json!({
        "id": chunk.chunk_id,
        "values": values,
        "metadata": metadata,
    })
}

fn parse_vector_count(payload: &Value) -> usize {
    payload["totalVectorCount"].as_u64().unwrap_or(0) as usize
}

fn parse_query_response(payload: &Value) -> Result<Vec<ChunkSearchResult>, ApiError> {
    let matches = payload["matches"]
        .as_array()
        .ok_or_else(|| ApiError::Internal("Pinecone query response has no matches".to_string()))?;

    let results = matches
        .iter()
        .filter_map(|item| {
            let chunk_id = item["id"].as_str()?.to_string();
            let score = item["score"].as_f64().unwrap_or(0.0) as f32;

            let mut metadata = item["metadata"].as_object().cloned().unwrap_or_default();
            let content = metadata
                .remove("content")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let source = metadata
                .remove("source")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();

            Some(ChunkSearchResult {
                chunk: StoredChunk {
                    chunk_id,
                    content,
                    source,
                    metadata: (!metadata.is_empty()).then_some(Value::Object(metadata)),
                },
                score,
            })
        })
        .collect();

    Ok(results)
}
