use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::{from_db_time, from_db_time_opt, parse_label, to_db_time};
use crate::core::errors::ApiError;
use crate::types::MessageRole;

const MAX_WINDOW: i64 = 200;

const MEMORY_COLUMNS: &str =
    "id, session_id, user_id, role, content, embedding_id, created_at, expires_at";

#[derive(Debug, Clone, Serialize)]
pub struct MemoryTurn {
    pub id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub embedding_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryTurn {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Per-session conversation turns with optional expiry.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    pool: AnyPool,
}

impl MemoryStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        role: MessageRole,
        content: &str,
        ttl: Option<Duration>,
    ) -> Result<MemoryTurn, ApiError> {
        let now = Utc::now();
        let turn = new_turn(session_id, user_id, role, content, now, ttl)?;
        self.insert(&turn).await?;
        Ok(turn)
    }

    /// Stores one user/assistant exchange.
    ///
    /// The assistant turn is stamped one microsecond after the user turn so
    /// ordering by `created_at` keeps the pair in sequence.
    pub async fn append_exchange(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        user_message: &str,
        assistant_message: &str,
        ttl: Option<Duration>,
    ) -> Result<(MemoryTurn, MemoryTurn), ApiError> {
        let now = Utc::now();
        let user_turn = new_turn(session_id, user_id, MessageRole::User, user_message, now, ttl)?;
        let assistant_turn = new_turn(
            session_id,
            user_id,
            MessageRole::Assistant,
            assistant_message,
            now + Duration::microseconds(1),
            ttl,
        )?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        for turn in [&user_turn, &assistant_turn] {
            insert_turn(&mut *tx, turn).await?;
        }
        tx.commit().await.map_err(ApiError::internal)?;

        Ok((user_turn, assistant_turn))
    }

    /// Last `limit` live turns of a session in chronological order.
    pub async fn recent(
        &self,
        session_id: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryTurn>, ApiError> {
        let limit = limit.clamp(1, MAX_WINDOW);
        let sql = format!(
            "\
            SELECT {} FROM conversation_memory
            WHERE session_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY created_at DESC
            LIMIT $3",
            MEMORY_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(to_db_time(&now))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut turns = rows
            .iter()
            .map(memory_turn_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    pub async fn clear(&self, session_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM conversation_memory WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected())
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            "DELETE FROM conversation_memory WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(to_db_time(&now))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.rows_affected())
    }

    async fn insert(&self, turn: &MemoryTurn) -> Result<(), ApiError> {
        let mut conn = self.pool.acquire().await.map_err(ApiError::internal)?;
        insert_turn(&mut *conn, turn).await
    }
}

fn new_turn(
    session_id: &str,
    user_id: Option<&str>,
    role: MessageRole,
    content: &str,
    created_at: DateTime<Utc>,
    ttl: Option<Duration>,
) -> Result<MemoryTurn, ApiError> {
    let expires_at = ttl
        .map(|ttl| {
            created_at.checked_add_signed(ttl).ok_or_else(|| {
                ApiError::Internal(format!("memory expiry out of range (ttl {})", ttl))
            })
        })
        .transpose()?;

    Ok(MemoryTurn {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        user_id: user_id.map(str::to_string),
        role,
        content: content.to_string(),
        embedding_id: None,
        created_at,
        expires_at,
    })
}

async fn insert_turn(conn: &mut sqlx::AnyConnection, turn: &MemoryTurn) -> Result<(), ApiError> {
    let sql = format!(
        "INSERT INTO conversation_memory ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        MEMORY_COLUMNS
    );
    sqlx::query(&sql)
        .bind(&turn.id)
        .bind(&turn.session_id)
        .bind(turn.user_id.clone())
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.embedding_id.clone())
        .bind(to_db_time(&turn.created_at))
        .bind(turn.expires_at.as_ref().map(to_db_time))
        .execute(conn)
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

fn memory_turn_from_row(row: &AnyRow) -> Result<MemoryTurn, ApiError> {
    let role: String = row.try_get("role").map_err(ApiError::internal)?;
    let created_at: String = row.try_get("created_at").map_err(ApiError::internal)?;

    Ok(MemoryTurn {
        id: row.try_get("id").map_err(ApiError::internal)?,
        session_id: row.try_get("session_id").map_err(ApiError::internal)?,
        user_id: row.try_get("user_id").map_err(ApiError::internal)?,
        role: parse_label(&role)?,
        content: row.try_get("content").map_err(ApiError::internal)?,
        embedding_id: row.try_get("embedding_id").map_err(ApiError::internal)?,
        created_at: from_db_time(&created_at)?,
        expires_at: from_db_time_opt(row.try_get("expires_at").map_err(ApiError::internal)?)?,
    })
}
