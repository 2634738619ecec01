use std::fmt::Write as _;

use crate::db::memory::MemoryTurn;
use crate::llm::{ChatMessage, ChatRequest};
use crate::rag::RetrievedSource;

const RESPONSE_TEMPERATURE: f64 = 0.3;
const RESPONSE_MAX_TOKENS: i32 = 800;

const SYSTEM_INSTRUCTIONS: &str = "You are a friendly and precise customer support assistant. \
Answer using the knowledge base excerpts below when they are relevant and cite the source \
name in brackets. If the excerpts do not cover the question, say so and offer to open a \
support ticket instead of guessing. Keep answers short and concrete.";

/// Assemble the generation request for one customer message.
///
/// Layout: system instructions with numbered knowledge snippets, then the
/// prior turns of the conversation, then the new message.
pub fn build_prompt(
    message: &str,
    sources: &[RetrievedSource],
    history: &[MemoryTurn],
) -> ChatRequest {
    let mut system = String::from(SYSTEM_INSTRUCTIONS);
    system.push_str("\n\nKnowledge base:\n");
    if sources.is_empty() {
        system.push_str("(no knowledge base articles matched this message)");
    } else {
        for (i, source) in sources.iter().enumerate() {
            let _ = write!(
                system,
                "\n[{}] (source: {})\n{}\n",
                i + 1,
                source.source,
                source.content.trim()
            );
        }
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: turn.role,
        content: turn.content.clone(),
    }));
    messages.push(ChatMessage::user(message));

    ChatRequest::new(messages)
        .with_temperature(RESPONSE_TEMPERATURE)
        .with_max_tokens(RESPONSE_MAX_TOKENS)
}
