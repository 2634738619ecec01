use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::{
    from_db_json, from_db_time, parse_label, sanitize_limit, sanitize_offset, to_db_json,
    to_db_time, Filter,
};
use crate::core::errors::ApiError;
use crate::types::{Intent, MessageType};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

const AUDIT_COLUMNS: &str = "id, session_id, user_id, message_type, intent, user_message, \
    retrieved_sources, llm_prompt, llm_response, action_type, action_payload, action_result, \
    error_message, latency_ms, token_count, created_at, metadata";

/// One interaction as it is about to be recorded.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub session_id: String,
    pub user_id: Option<String>,
    pub message_type: MessageType,
    pub intent: Option<Intent>,
    pub user_message: Option<String>,
    pub retrieved_sources: Option<Value>,
    pub llm_prompt: Option<String>,
    pub llm_response: Option<String>,
    pub action_type: Option<String>,
    pub action_payload: Option<Value>,
    pub action_result: Option<Value>,
    pub error_message: Option<String>,
    pub latency_ms: Option<i64>,
    pub token_count: Option<i64>,
    pub metadata: Option<Value>,
}

impl NewAuditLog {
    pub fn new(session_id: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            message_type,
            intent: None,
            user_message: None,
            retrieved_sources: None,
            llm_prompt: None,
            llm_response: None,
            action_type: None,
            action_payload: None,
            action_result: None,
            error_message: None,
            latency_ms: None,
            token_count: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub message_type: MessageType,
    pub intent: Option<Intent>,
    pub user_message: Option<String>,
    pub retrieved_sources: Option<Value>,
    pub llm_prompt: Option<String>,
    pub llm_response: Option<String>,
    pub action_type: Option<String>,
    pub action_payload: Option<Value>,
    pub action_result: Option<Value>,
    pub error_message: Option<String>,
    pub latency_ms: Option<i64>,
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub session_id: Option<String>,
    pub intent: Option<Intent>,
    pub message_type: Option<MessageType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total_interactions: i64,
    pub errors: i64,
    pub average_latency_ms: Option<f64>,
    pub total_tokens: i64,
    pub by_intent: BTreeMap<String, i64>,
}

/// Append-only access to `audit_logs`.
///
/// There is deliberately no update or delete method.
#[derive(Debug, Clone)]
pub struct AuditStore {
    pool: AnyPool,
}

impl AuditStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: NewAuditLog) -> Result<AuditLog, ApiError> {
        let log = AuditLog {
            id: Uuid::new_v4().to_string(),
            session_id: entry.session_id,
            user_id: entry.user_id,
            message_type: entry.message_type,
            intent: entry.intent,
            user_message: entry.user_message,
            retrieved_sources: entry.retrieved_sources,
            llm_prompt: entry.llm_prompt,
            llm_response: entry.llm_response,
            action_type: entry.action_type,
            action_payload: entry.action_payload,
            action_result: entry.action_result,
            error_message: entry.error_message,
            latency_ms: entry.latency_ms,
            token_count: entry.token_count,
            created_at: Utc::now(),
            metadata: entry.metadata,
        };

        let sql = format!(
            "INSERT INTO audit_logs ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            AUDIT_COLUMNS
        );

        sqlx::query(&sql)
            .bind(&log.id)
            .bind(&log.session_id)
            .bind(log.user_id.clone())
            .bind(log.message_type.as_str())
            .bind(log.intent.map(|intent| intent.as_str().to_string()))
            .bind(log.user_message.clone())
            .bind(to_db_json(&log.retrieved_sources)?)
            .bind(log.llm_prompt.clone())
            .bind(log.llm_response.clone())
            .bind(log.action_type.clone())
            .bind(to_db_json(&log.action_payload)?)
            .bind(to_db_json(&log.action_result)?)
            .bind(log.error_message.clone())
            .bind(log.latency_ms)
            .bind(log.token_count)
            .bind(to_db_time(&log.created_at))
            .bind(to_db_json(&log.metadata)?)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(log)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AuditLog>, ApiError> {
        let sql = format!("SELECT {} FROM audit_logs WHERE id = $1", AUDIT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(audit_log_from_row).transpose()
    }

    pub async fn list(&self, query: AuditQuery) -> Result<AuditPage, ApiError> {
        let limit = sanitize_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        let offset = sanitize_offset(query.offset);

        let mut filter = Filter::default();
        if let Some(session_id) = query.session_id {
            filter.push("session_id =", session_id);
        }
        if let Some(intent) = query.intent {
            filter.push("intent =", intent.as_str());
        }
        if let Some(message_type) = query.message_type {
            filter.push("message_type =", message_type.as_str());
        }
        if let Some(since) = query.since {
            filter.push("created_at >=", to_db_time(&since));
        }

        let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", filter.where_clause());
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in filter.binds() {
            count_query = count_query.bind(value.clone());
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let list_sql = format!(
            "SELECT {} FROM audit_logs{} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            AUDIT_COLUMNS,
            filter.where_clause(),
            filter.next_placeholder(1),
            filter.next_placeholder(2),
        );
        let mut list_query = sqlx::query(&list_sql);
        for value in filter.binds() {
            list_query = list_query.bind(value.clone());
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let items = rows
            .iter()
            .map(audit_log_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditPage {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn stats(&self) -> Result<AuditStats, ApiError> {
        let row = sqlx::query(
            "\
            SELECT COUNT(*) AS total,
                   COALESCE(CAST(SUM(CASE WHEN error_message IS NULL THEN 0 ELSE 1 END) AS BIGINT), 0) AS errors,
                   CAST(AVG(latency_ms) AS DOUBLE PRECISION) AS average_latency,
                   COALESCE(CAST(SUM(token_count) AS BIGINT), 0) AS total_tokens
            FROM audit_logs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let intent_rows = sqlx::query(
            "\
            SELECT COALESCE(intent, 'unknown') AS intent_label, COUNT(*) AS total
            FROM audit_logs
            GROUP BY COALESCE(intent, 'unknown')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut by_intent = BTreeMap::new();
        for intent_row in &intent_rows {
            let label: String = intent_row.try_get("intent_label").map_err(ApiError::internal)?;
            let total: i64 = intent_row.try_get("total").map_err(ApiError::internal)?;
            by_intent.insert(label, total);
        }

        Ok(AuditStats {
            total_interactions: row.try_get("total").map_err(ApiError::internal)?,
            errors: row.try_get("errors").map_err(ApiError::internal)?,
            average_latency_ms: row.try_get("average_latency").map_err(ApiError::internal)?,
            total_tokens: row.try_get("total_tokens").map_err(ApiError::internal)?,
            by_intent,
        })
    }
}

fn audit_log_from_row(row: &AnyRow) -> Result<AuditLog, ApiError> {
    let message_type: String = row.try_get("message_type").map_err(ApiError::internal)?;
    let intent: Option<String> = row.try_get("intent").map_err(ApiError::internal)?;
    let created_at: String = row.try_get("created_at").map_err(ApiError::internal)?;

    Ok(AuditLog {
        id: row.try_get("id").map_err(ApiError::internal)?,
        session_id: row.try_get("session_id").map_err(ApiError::internal)?,
        user_id: row.try_get("user_id").map_err(ApiError::internal)?,
        message_type: parse_label(&message_type)?,
        intent: intent.as_deref().map(parse_label).transpose()?,
        user_message: row.try_get("user_message").map_err(ApiError::internal)?,
        retrieved_sources: from_db_json(
            row.try_get("retrieved_sources").map_err(ApiError::internal)?,
        ),
        llm_prompt: row.try_get("llm_prompt").map_err(ApiError::internal)?,
        llm_response: row.try_get("llm_response").map_err(ApiError::internal)?,
        action_type: row.try_get("action_type").map_err(ApiError::internal)?,
        action_payload: from_db_json(row.try_get("action_payload").map_err(ApiError::internal)?),
        action_result: from_db_json(row.try_get("action_result").map_err(ApiError::internal)?),
        error_message: row.try_get("error_message").map_err(ApiError::internal)?,
        latency_ms: row.try_get("latency_ms").map_err(ApiError::internal)?,
        token_count: row.try_get("token_count").map_err(ApiError::internal)?,
        created_at: from_db_time(&created_at)?,
        metadata: from_db_json(row.try_get("metadata").map_err(ApiError::internal)?),
    })
}
