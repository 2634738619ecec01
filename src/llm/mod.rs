#[cfg(test)]
pub(crate) mod fake;
pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use types::{ChatCompletion, ChatMessage, ChatRequest, TokenUsage};
