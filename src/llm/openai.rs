use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::{ChatCompletion, ChatRequest, TokenUsage};
use crate::core::config::Settings;
use crate::core::errors::ApiError;

/// OpenAI-compatible chat and embedding client.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embedding_dimension: usize,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            api_key: settings.openai_api_key.clone(),
            chat_model: settings.openai_chat_model.clone(),
            embedding_model: settings.openai_embedding_model.clone(),
            embedding_dimension: settings.embedding_dimension,
            client,
        })
    }

    fn api_key(&self) -> Result<&str, ApiError> {
        if self.api_key.trim().is_empty() {
            return Err(ApiError::ServiceUnavailable(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }
        Ok(&self.api_key)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let api_key = self.api_key()?;
        let url = format!("{}{}", self.base_url, path);

        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "OpenAI {} error ({}): {}",
                path, status, text
            )));
        }

        res.json().await.map_err(ApiError::internal)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ApiError> {
        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if request.json_mode {
                obj.insert("response_format".to_string(), json!({"type": "json_object"}));
            }
        }

        let payload = self.post("/chat/completions", &body).await?;
        parse_chat_response(&payload)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let payload = self.post("/embeddings", &body).await?;
        let embeddings = parse_embedding_response(&payload)?;
        check_embeddings(&embeddings, inputs.len(), self.embedding_dimension)?;

        Ok(embeddings)
    }
}

fn parse_chat_response(payload: &Value) -> Result<ChatCompletion, ApiError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ApiError::Internal("chat response has no content".to_string()))?
        .to_string();

    let usage = &payload["usage"];
    let prompt_tokens = usage["prompt_tokens"].as_i64().unwrap_or(0);
    let completion_tokens = usage["completion_tokens"].as_i64().unwrap_or(0);
    let total_tokens = usage["total_tokens"]
        .as_i64()
        .unwrap_or(prompt_tokens + completion_tokens);

    Ok(ChatCompletion {
        content,
        usage: TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        },
    })
}

fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>, ApiError> {
    let data = payload["data"]
        .as_array()
        .ok_or_else(|| ApiError::Internal("embedding response has no data".to_string()))?;

    let mut indexed: Vec<(u64, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().unwrap_or(position as u64);
        let vector = item["embedding"]
            .as_array()
            .ok_or_else(|| ApiError::Internal("embedding item has no vector".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

/// One vector per input, each of the configured dimension.
fn check_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), ApiError> {
    if embeddings.len() != expected_count {
        return Err(ApiError::Internal(format!(
            "expected {} embeddings, received {}",
            expected_count,
            embeddings.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimension) {
        return Err(ApiError::Internal(format!(
            "embedding dimension mismatch: {} != {}",
            bad.len(),
            dimension
        )));
    }
    Ok(())
}
