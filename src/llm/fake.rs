use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::provider::LlmProvider;
use super::types::{ChatCompletion, ChatRequest, TokenUsage};
use crate::core::errors::ApiError;

pub const FAKE_DIMENSION: usize = 8;

/// Scripted provider for unit tests.
///
/// Chat replies are served from a queue (falling back to a fixed answer) and
/// embeddings are a bag-of-words hash, so texts sharing words score high.
enum Scripted {
    Reply(String),
    Error(String),
    Panic(String),
}

#[derive(Default)]
pub struct FakeLlm {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
    fail_embeddings: bool,
    /// Embedding calls (1-based) that fail.
    fail_embed_call: Option<usize>,
    embed_calls: Mutex<usize>,
    chat_delay: Option<Duration>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_embeddings() -> Self {
        Self {
            fail_embeddings: true,
            ..Self::default()
        }
    }

    /// Embeddings succeed until the `call`-th request, which fails.
    pub fn failing_embeddings_on_call(call: usize) -> Self {
        Self {
            fail_embed_call: Some(call),
            ..Self::default()
        }
    }

    /// Every chat request sleeps for `delay` before answering.
    pub fn with_chat_delay(delay: Duration) -> Self {
        Self {
            chat_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.push(Scripted::Reply(reply.into()));
    }

    pub fn push_error(&self, error: impl Into<String>) {
        self.push(Scripted::Error(error.into()));
    }

    pub fn push_panic(&self, message: impl Into<String>) {
        self.push(Scripted::Panic(message.into()));
    }

    fn push(&self, scripted: Scripted) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(scripted);
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; FAKE_DIMENSION];
    for word in text.split_whitespace() {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % FAKE_DIMENSION] += 1.0;
    }
    vector
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ApiError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        if let Some(delay) = self.chat_delay {
            tokio::time::sleep(delay).await;
        }

        match next {
            Some(Scripted::Panic(message)) => panic!("{}", message),
            Some(Scripted::Error(error)) => Err(ApiError::Internal(error)),
            Some(Scripted::Reply(content)) => Ok(ChatCompletion {
                content,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            }),
            None => Ok(ChatCompletion {
                content: "Happy to help.".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            }),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let call = match self.embed_calls.lock() {
            Ok(mut calls) => {
                *calls += 1;
                *calls
            }
            Err(_) => 0,
        };
        if self.fail_embeddings || self.fail_embed_call == Some(call) {
            return Err(ApiError::Internal("embedding backend offline".to_string()));
        }
        Ok(inputs.iter().map(|input| bag_of_words(input)).collect())
    }
}
