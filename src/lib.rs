//! Customer-support backend: chat and webhook intake, knowledge-base
//! retrieval, intent classification, ticketing and an append-only audit trail.

pub mod core;
pub mod db;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod support;
pub mod types;
