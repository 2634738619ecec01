use async_trait::async_trait;

use super::types::{ChatCompletion, ChatRequest};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion with token accounting
    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ApiError>;

    /// generate one embedding per input, in input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
