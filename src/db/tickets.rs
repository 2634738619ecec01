use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::{
    from_db_json, from_db_time, from_db_time_opt, is_unique_violation, parse_label,
    sanitize_limit, sanitize_offset, to_db_json, to_db_time, Filter,
};
use crate::core::errors::ApiError;
use crate::types::{TicketPriority, TicketStatus};

const MAX_NUMBER_ATTEMPTS: usize = 5;
const MAX_UPDATE_ATTEMPTS: usize = 10;
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

const TICKET_COLUMNS: &str = "id, ticket_number, title, description, priority, status, category, \
    customer_email, customer_name, assigned_to, session_id, created_at, updated_at, resolved_at, \
    metadata";

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
    pub category: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Option<Value>,
}

impl NewTicket {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: TicketPriority::Medium,
            category: None,
            customer_email: None,
            customer_name: None,
            session_id: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: String,
    pub ticket_number: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub category: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub assigned_to: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<String>,
    pub category: Option<String>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
            && self.category.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub session_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `TKT-YYYYMMDD-XXXXXX` with six random uppercase alphanumerics.
pub fn generate_ticket_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect();
    format!("TKT-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Applies an update to a ticket in place and stamps `updated_at`.
///
/// Entering `resolved` or `closed` sets `resolved_at` once; leaving those
/// states clears it. Assigning an `open` ticket without an explicit status
/// moves it to `assigned`.
pub fn apply_update(ticket: &mut Ticket, update: TicketUpdate, now: DateTime<Utc>) {
    let mut next_status = update.status;

    if let Some(assignee) = update.assigned_to {
        let assignee = assignee.trim().to_string();
        if assignee.is_empty() {
            ticket.assigned_to = None;
        } else {
            if next_status.is_none() && ticket.status == TicketStatus::Open {
                next_status = Some(TicketStatus::Assigned);
            }
            ticket.assigned_to = Some(assignee);
        }
    }

    if let Some(status) = next_status {
        if status.is_terminal() {
            if ticket.resolved_at.is_none() {
                ticket.resolved_at = Some(now);
            }
        } else {
            ticket.resolved_at = None;
        }
        ticket.status = status;
    }

    if let Some(priority) = update.priority {
        ticket.priority = priority;
    }
    if let Some(category) = update.category {
        ticket.category = Some(category);
    }

    ticket.updated_at = now;
}

/// A fresh `updated_at` that is stored strictly after `read_version`.
///
/// Stored timestamps have microsecond precision, so two writes in the same
/// microsecond would otherwise share a version.
fn next_version(read_version: &str) -> DateTime<Utc> {
    let now = Utc::now();
    match from_db_time(read_version) {
        Ok(previous) if to_db_time(&now).as_str() <= read_version => {
            previous + chrono::Duration::microseconds(1)
        }
        _ => now,
    }
}

#[derive(Debug, Clone)]
pub struct TicketStore {
    pool: AnyPool,
}

impl TicketStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_ticket: NewTicket) -> Result<Ticket, ApiError> {
        self.create_with_numbers(new_ticket, generate_ticket_number)
            .await
    }

    /// Inserts a ticket, drawing a fresh number after each unique collision.
    pub async fn create_with_numbers<F>(
        &self,
        new_ticket: NewTicket,
        mut next_number: F,
    ) -> Result<Ticket, ApiError>
    where
        F: FnMut(DateTime<Utc>) -> String,
    {
        let title = new_ticket.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".to_string()));
        }

        let now = Utc::now();
        let mut ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            ticket_number: String::new(),
            title,
            description: new_ticket.description,
            priority: new_ticket.priority,
            status: TicketStatus::Open,
            category: new_ticket.category,
            customer_email: new_ticket.customer_email,
            customer_name: new_ticket.customer_name,
            assigned_to: None,
            session_id: new_ticket.session_id,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            metadata: new_ticket.metadata,
        };

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            ticket.ticket_number = next_number(now);
            match self.insert(&ticket).await {
                Ok(()) => return Ok(ticket),
                Err(err) if is_unique_violation(&err) => {
                    tracing::warn!(
                        ticket_number = %ticket.ticket_number,
                        attempt,
                        "ticket number collision, retrying"
                    );
                }
                Err(err) => return Err(ApiError::internal(err)),
            }
        }

        Err(ApiError::Conflict(
            "could not allocate a unique ticket number".to_string(),
        ))
    }

    pub async fn get_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, ApiError> {
        let sql = format!(
            "SELECT {} FROM tickets WHERE ticket_number = $1",
            TICKET_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(ticket_from_row).transpose()
    }

    pub async fn list(&self, query: TicketQuery) -> Result<Vec<Ticket>, ApiError> {
        let limit = sanitize_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        let offset = sanitize_offset(query.offset);

        let mut filter = Filter::default();
        if let Some(status) = query.status {
            filter.push("status =", status.as_str());
        }
        if let Some(priority) = query.priority {
            filter.push("priority =", priority.as_str());
        }
        if let Some(session_id) = query.session_id {
            filter.push("session_id =", session_id);
        }

        let sql = format!(
            "SELECT {} FROM tickets{} ORDER BY created_at DESC, ticket_number DESC LIMIT ${} OFFSET ${}",
            TICKET_COLUMNS,
            filter.where_clause(),
            filter.next_placeholder(1),
            filter.next_placeholder(2),
        );
        let mut list_query = sqlx::query(&sql);
        for value in filter.binds() {
            list_query = list_query.bind(value.clone());
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        rows.iter().map(ticket_from_row).collect()
    }

    /// Applies `update` to the current row.
    ///
    /// The write only lands if `updated_at` still holds the value that was
    /// read, so concurrent updates never overwrite each other's fields; the
    /// loser re-reads and applies its change on top.
    pub async fn update(
        &self,
        ticket_number: &str,
        update: TicketUpdate,
    ) -> Result<Ticket, ApiError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self
                .get_by_number(ticket_number)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Ticket {} not found", ticket_number)))?;
            let read_version = to_db_time(&current.updated_at);

            let mut ticket = current;
            apply_update(&mut ticket, update.clone(), next_version(&read_version));

            let result = sqlx::query(
                "\
                UPDATE tickets
                SET status = $1, priority = $2, assigned_to = $3, category = $4,
                    updated_at = $5, resolved_at = $6
                WHERE ticket_number = $7 AND updated_at = $8",
            )
            .bind(ticket.status.as_str())
            .bind(ticket.priority.as_str())
            .bind(ticket.assigned_to.clone())
            .bind(ticket.category.clone())
            .bind(to_db_time(&ticket.updated_at))
            .bind(ticket.resolved_at.as_ref().map(to_db_time))
            .bind(&ticket.ticket_number)
            .bind(&read_version)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

            if result.rows_affected() == 1 {
                return Ok(ticket);
            }
            tracing::debug!(ticket_number = %ticket_number, attempt, "ticket update raced, retrying");
        }

        Err(ApiError::Conflict(format!(
            "Ticket {} is being updated concurrently",
            ticket_number
        )))
    }

    async fn insert(&self, ticket: &Ticket) -> Result<(), sqlx::Error> {
        let metadata = to_db_json(&ticket.metadata).map_err(|err| sqlx::Error::Encode(err.into()))?;
        let sql = format!(
            "INSERT INTO tickets ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            TICKET_COLUMNS
        );

        sqlx::query(&sql)
            .bind(&ticket.id)
            .bind(&ticket.ticket_number)
            .bind(&ticket.title)
            .bind(ticket.description.clone())
            .bind(ticket.priority.as_str())
            .bind(ticket.status.as_str())
            .bind(ticket.category.clone())
            .bind(ticket.customer_email.clone())
            .bind(ticket.customer_name.clone())
            .bind(ticket.assigned_to.clone())
            .bind(ticket.session_id.clone())
            .bind(to_db_time(&ticket.created_at))
            .bind(to_db_time(&ticket.updated_at))
            .bind(ticket.resolved_at.as_ref().map(to_db_time))
            .bind(metadata)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn ticket_from_row(row: &AnyRow) -> Result<Ticket, ApiError> {
    let priority: String = row.try_get("priority").map_err(ApiError::internal)?;
    let status: String = row.try_get("status").map_err(ApiError::internal)?;
    let created_at: String = row.try_get("created_at").map_err(ApiError::internal)?;
    let updated_at: String = row.try_get("updated_at").map_err(ApiError::internal)?;

    Ok(Ticket {
        id: row.try_get("id").map_err(ApiError::internal)?,
        ticket_number: row.try_get("ticket_number").map_err(ApiError::internal)?,
        title: row.try_get("title").map_err(ApiError::internal)?,
        description: row.try_get("description").map_err(ApiError::internal)?,
        priority: parse_label(&priority)?,
        status: parse_label(&status)?,
        category: row.try_get("category").map_err(ApiError::internal)?,
        customer_email: row.try_get("customer_email").map_err(ApiError::internal)?,
        customer_name: row.try_get("customer_name").map_err(ApiError::internal)?,
        assigned_to: row.try_get("assigned_to").map_err(ApiError::internal)?,
        session_id: row.try_get("session_id").map_err(ApiError::internal)?,
        created_at: from_db_time(&created_at)?,
        updated_at: from_db_time(&updated_at)?,
        resolved_at: from_db_time_opt(row.try_get("resolved_at").map_err(ApiError::internal)?)?,
        metadata: from_db_json(row.try_get("metadata").map_err(ApiError::internal)?),
    })
}
