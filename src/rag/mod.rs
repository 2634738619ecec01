//! Knowledge-base retrieval.
//!
//! Documents are split into overlapping windows, embedded through the
//! configured [`LlmProvider`](crate::llm::LlmProvider), and stored in a
//! [`VectorStore`] backend selected by `VECTOR_DB_TYPE`.

pub mod chunking;
pub mod ingest;
pub mod local;
pub mod pinecone;
pub mod retriever;
pub mod store;

use std::sync::Arc;

pub use chunking::{chunk_text, TextChunk};
pub use ingest::{Ingestor, NewDocumentUpload};
pub use local::LocalVectorStore;
pub use pinecone::PineconeStore;
pub use retriever::{RetrievedSource, Retriever};
pub use store::{ChunkSearchResult, StoredChunk, VectorStore};

use crate::core::config::{Settings, VectorDbType};
use crate::core::errors::ApiError;

/// Opens the vector store backend named in the settings.
pub async fn open_vector_store(settings: &Settings) -> Result<Arc<dyn VectorStore>, ApiError> {
    match settings.vector_db_type {
        VectorDbType::Chroma => {
            let store = LocalVectorStore::new(&settings.chroma_persist_dir).await?;
            Ok(Arc::new(store))
        }
        VectorDbType::Pinecone => Ok(Arc::new(PineconeStore::new(settings)?)),
    }
}
