//! Relational persistence.
//!
//! All stores talk to the database through the sqlx `Any` driver so the same
//! SQL runs against PostgreSQL in production and SQLite in tests. To stay
//! portable the queries only use `$N` placeholders, and timestamps and JSON
//! documents are stored as text.

pub mod audit;
pub mod documents;
pub mod memory;
mod schema;
pub mod tickets;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::core::errors::ApiError;

pub use audit::AuditStore;
pub use documents::DocumentStore;
pub use memory::MemoryStore;
pub use tickets::TicketStore;

#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ApiError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory SQLite database with the schema applied.
    pub async fn in_memory() -> Result<Self, ApiError> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn init_schema(&self) -> Result<(), ApiError> {
        schema::create_all(&self.pool).await
    }

    pub fn audit(&self) -> AuditStore {
        AuditStore::new(self.pool.clone())
    }

    pub fn memory(&self) -> MemoryStore {
        MemoryStore::new(self.pool.clone())
    }

    pub fn tickets(&self) -> TicketStore {
        TicketStore::new(self.pool.clone())
    }

    pub fn documents(&self) -> DocumentStore {
        DocumentStore::new(self.pool.clone())
    }
}

pub(crate) fn to_db_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| ApiError::Internal(format!("invalid timestamp {:?}: {}", value, err)))
}

pub(crate) fn from_db_time_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value.as_deref().map(from_db_time).transpose()
}

pub(crate) fn to_db_json(value: &Option<Value>) -> Result<Option<String>, ApiError> {
    value
        .as_ref()
        .map(|value| serde_json::to_string(value).map_err(ApiError::internal))
        .transpose()
}

pub(crate) fn from_db_json(value: Option<String>) -> Option<Value> {
    value.and_then(|raw| serde_json::from_str(&raw).ok())
}

pub(crate) fn parse_label<T>(value: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(ApiError::Internal)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Clamps a caller-supplied page size into `1..=max`.
pub(crate) fn sanitize_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    match limit {
        None => default,
        Some(value) if value <= 0 => 1,
        Some(value) => value.min(max),
    }
}

pub(crate) fn sanitize_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Accumulates `AND`-joined conditions with numbered placeholders.
#[derive(Default)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    binds: Vec<String>,
}

impl Filter {
    pub fn push(&mut self, column_expr: &str, value: impl Into<String>) {
        self.binds.push(value.into());
        self.clauses
            .push(format!("{} ${}", column_expr, self.binds.len()));
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn next_placeholder(&self, offset: usize) -> usize {
        self.binds.len() + offset
    }

    pub fn binds(&self) -> &[String] {
        &self.binds
    }
}
