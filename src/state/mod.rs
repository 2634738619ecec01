use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::security::WebhookKey;
use crate::db::{AuditStore, Database, DocumentStore, MemoryStore, TicketStore};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{open_vector_store, Ingestor, Retriever, VectorStore};
use crate::support::{ActionPlanner, IntentClassifier, SupportPipeline, WebhookNotifier};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// Contains references to:
/// - Settings
/// - The relational stores (audit, memory, tickets, documents)
/// - The vector store
/// - The support pipeline and the document ingestor built on top of them
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub audit: AuditStore,
    pub memory: MemoryStore,
    pub tickets: TicketStore,
    pub documents: DocumentStore,
    pub vector_store: Arc<dyn VectorStore>,
    pub pipeline: SupportPipeline,
    pub ingestor: Ingestor,
    pub webhook_key: WebhookKey,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Connecting to the relational database and creating the schema
    /// 2. Building the OpenAI provider
    /// 3. Opening the vector store selected by `VECTOR_DB_TYPE`
    /// 4. Wiring the support pipeline and the ingestor
    pub async fn initialize(settings: Arc<Settings>) -> Result<Arc<Self>, InitializationError> {
        let db = Database::connect(&settings.connection_url(), settings.database_max_connections)
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;
        db.init_schema()
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;
        tracing::info!("database_initialized");

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OpenAiProvider::new(&settings).map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let vector_store = open_vector_store(&settings)
            .await
            .map_err(|e| InitializationError::VectorStore(e.into()))?;
        tracing::info!(
            backend = vector_store.name(),
            "vector_store_initialized"
        );

        Self::from_parts(settings, db, llm, vector_store)
    }

    /// Assembles the state from already-opened backends.
    pub fn from_parts(
        settings: Arc<Settings>,
        db: Database,
        llm: Arc<dyn LlmProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Arc<Self>, InitializationError> {
        let memory_ttl = settings
            .memory_ttl()
            .map_err(|e| InitializationError::Settings(e.into()))?;
        let notifier = WebhookNotifier::new(&settings.n8n_webhook_url, settings.n8n_api_key.clone())
            .map_err(|e| InitializationError::Notifier(e.into()))?;

        let retriever = Retriever::new(
            llm.clone(),
            vector_store.clone(),
            settings.rag_top_k,
            settings.rag_similarity_threshold,
        );
        let pipeline = SupportPipeline::new(
            llm.clone(),
            retriever,
            IntentClassifier::new(llm.clone()),
            ActionPlanner::new(db.tickets(), notifier),
            db.memory(),
            db.audit(),
            settings.memory_window,
            memory_ttl,
        );
        let ingestor = Ingestor::new(db.documents(), llm, vector_store.clone(), &settings);

        Ok(Arc::new(AppState {
            audit: db.audit(),
            memory: db.memory(),
            tickets: db.tickets(),
            documents: db.documents(),
            webhook_key: WebhookKey::new(settings.n8n_api_key.clone()),
            settings,
            vector_store,
            pipeline,
            ingestor,
        }))
    }
}
