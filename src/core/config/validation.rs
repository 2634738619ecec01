use super::settings::{ConfigError, Settings, VectorDbType};

/// Ten years.
pub const MAX_MEMORY_TTL_HOURS: u64 = 87_600;

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    validate_min("RAG_TOP_K", settings.rag_top_k as u64, 1)?;
    validate_min("CHUNK_SIZE", settings.chunk_size as u64, 1)?;
    validate_min("EMBEDDING_DIMENSION", settings.embedding_dimension as u64, 1)?;
    validate_min("DATABASE_MAX_CONNECTIONS", settings.database_max_connections as u64, 1)?;
    validate_min("MEMORY_WINDOW", settings.memory_window.max(0) as u64, 1)?;
    validate_min("MEMORY_TTL_HOURS", settings.memory_ttl_hours.max(0) as u64, 1)?;
    validate_max(
        "MEMORY_TTL_HOURS",
        settings.memory_ttl_hours.max(0) as u64,
        MAX_MEMORY_TTL_HOURS,
    )?;
    validate_min(
        "MEMORY_REAPER_INTERVAL_SECS",
        settings.memory_reaper_interval_secs,
        1,
    )?;
    validate_min("LLM_TIMEOUT_SECS", settings.llm_timeout_secs, 1)?;

    let threshold = settings.rag_similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::Validation(format!(
            "RAG_SIMILARITY_THRESHOLD must be between 0 and 1 (got {})",
            threshold
        )));
    }

    if settings.chunk_overlap >= settings.chunk_size {
        return Err(ConfigError::Validation(format!(
            "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
            settings.chunk_overlap, settings.chunk_size
        )));
    }

    if settings.vector_db_type == VectorDbType::Pinecone && settings.pinecone_index_host.is_none()
    {
        return Err(ConfigError::Validation(
            "PINECONE_INDEX_HOST is required when VECTOR_DB_TYPE=pinecone".to_string(),
        ));
    }

    if settings.cors_allowed_origins.is_empty() {
        return Err(ConfigError::Validation(
            "CORS_ALLOWED_ORIGINS must list at least one origin".to_string(),
        ));
    }

    Ok(())
}

fn validate_min(key: &str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::Validation(format!(
            "{} must be >= {} (got {})",
            key, min, value
        )));
    }
    Ok(())
}

fn validate_max(key: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be <= {} (got {})",
            key, max, value
        )));
    }
    Ok(())
}
