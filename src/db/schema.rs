use sqlx::AnyPool;

use crate::core::errors::ApiError;

const STATEMENTS: &[&str] = &[
    "\
    CREATE TABLE IF NOT EXISTS audit_logs (
        id VARCHAR(36) PRIMARY KEY,
        session_id VARCHAR(255) NOT NULL,
        user_id VARCHAR(255),
        message_type VARCHAR(50) NOT NULL,
        intent VARCHAR(50),
        user_message TEXT,
        retrieved_sources TEXT,
        llm_prompt TEXT,
        llm_response TEXT,
        action_type VARCHAR(100),
        action_payload TEXT,
        action_result TEXT,
        error_message TEXT,
        latency_ms BIGINT,
        token_count BIGINT,
        created_at VARCHAR(32) NOT NULL,
        metadata TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_session_id ON audit_logs(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs(created_at)",
    "\
    CREATE TABLE IF NOT EXISTS conversation_memory (
        id VARCHAR(36) PRIMARY KEY,
        session_id VARCHAR(255) NOT NULL,
        user_id VARCHAR(255),
        role VARCHAR(20) NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
        content TEXT NOT NULL,
        embedding_id VARCHAR(255),
        created_at VARCHAR(32) NOT NULL,
        expires_at VARCHAR(32)
    )",
    "CREATE INDEX IF NOT EXISTS idx_conversation_memory_session_id ON conversation_memory(session_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_conversation_memory_expires_at ON conversation_memory(expires_at)",
    "\
    CREATE TABLE IF NOT EXISTS tickets (
        id VARCHAR(36) PRIMARY KEY,
        ticket_number VARCHAR(50) NOT NULL UNIQUE,
        title VARCHAR(500) NOT NULL CHECK(length(title) > 0),
        description TEXT,
        priority VARCHAR(20) NOT NULL DEFAULT 'medium'
            CHECK(priority IN ('low', 'medium', 'high', 'urgent')),
        status VARCHAR(50) NOT NULL DEFAULT 'open'
            CHECK(status IN ('open', 'assigned', 'in_progress', 'resolved', 'closed')),
        category VARCHAR(100),
        customer_email VARCHAR(255),
        customer_name VARCHAR(255),
        assigned_to VARCHAR(255),
        session_id VARCHAR(255),
        created_at VARCHAR(32) NOT NULL,
        updated_at VARCHAR(32) NOT NULL,
        resolved_at VARCHAR(32),
        metadata TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_session_id ON tickets(session_id)",
    "\
    CREATE TABLE IF NOT EXISTS documents (
        id VARCHAR(36) PRIMARY KEY,
        filename VARCHAR(500) NOT NULL,
        file_path VARCHAR(1000),
        file_type VARCHAR(50),
        file_size BIGINT,
        chunk_count BIGINT NOT NULL DEFAULT 0,
        embedding_ids TEXT,
        status VARCHAR(50) NOT NULL DEFAULT 'pending'
            CHECK(status IN ('pending', 'processing', 'processed', 'failed')),
        error_message TEXT,
        created_at VARCHAR(32) NOT NULL,
        processed_at VARCHAR(32),
        metadata TEXT
    )",
];

pub async fn create_all(pool: &AnyPool) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::internal)?;

    for statement in STATEMENTS.iter().copied() {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
    }

    tx.commit().await.map_err(ApiError::internal)?;
    Ok(())
}
