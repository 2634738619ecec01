use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Invalid settings: {0}")]
    Settings(#[source] anyhow::Error),

    #[error("Failed to initialize database: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Failed to initialize vector store: {0}")]
    VectorStore(#[source] anyhow::Error),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize webhook notifier: {0}")]
    Notifier(#[source] anyhow::Error),
}
