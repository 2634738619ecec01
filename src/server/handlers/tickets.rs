use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_len, parse_label_param, ApiJson, ApiQuery, MAX_FIELD_CHARS};
use crate::core::errors::ApiError;
use crate::db::tickets::{NewTicket, TicketQuery, TicketUpdate};
use crate::state::AppState;
use crate::types::TicketPriority;

const MAX_TITLE_CHARS: usize = 500;
const MAX_CATEGORY_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TicketListParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub session_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    check_len("title", Some(title), MAX_TITLE_CHARS)?;
    check_len("category", payload.category.as_deref(), MAX_CATEGORY_CHARS)?;
    check_len("customer_email", payload.customer_email.as_deref(), MAX_FIELD_CHARS)?;
    check_len("customer_name", payload.customer_name.as_deref(), MAX_FIELD_CHARS)?;
    check_len("session_id", payload.session_id.as_deref(), MAX_FIELD_CHARS)?;

    let priority = parse_label_param::<TicketPriority>("priority", payload.priority.as_deref())?
        .unwrap_or(TicketPriority::Medium);

    let ticket = state
        .tickets
        .create(NewTicket {
            title: title.to_string(),
            description: payload.description,
            priority,
            category: payload.category,
            customer_email: payload.customer_email,
            customer_name: payload.customer_name,
            session_id: payload.session_id,
            metadata: payload.metadata,
        })
        .await?;

    tracing::info!(
        ticket_number = %ticket.ticket_number,
        priority = %ticket.priority,
        "ticket_created"
    );
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<TicketListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = TicketQuery {
        status: parse_label_param("status", params.status.as_deref())?,
        priority: parse_label_param("priority", params.priority.as_deref())?,
        session_id: params.session_id.filter(|s| !s.trim().is_empty()),
        limit: params.limit,
        offset: params.offset,
    };

    let tickets = state.tickets.list(query).await?;
    Ok(Json(json!({
        "count": tickets.len(),
        "tickets": tickets
    })))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .tickets
        .get_by_number(&ticket_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {} not found", ticket_number)))?;
    Ok(Json(ticket))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_number): Path<String>,
    ApiJson(payload): ApiJson<UpdateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_len("assigned_to", payload.assigned_to.as_deref(), MAX_FIELD_CHARS)?;
    check_len("category", payload.category.as_deref(), MAX_CATEGORY_CHARS)?;

    let update = TicketUpdate {
        status: parse_label_param("status", payload.status.as_deref())?,
        priority: parse_label_param("priority", payload.priority.as_deref())?,
        assigned_to: payload.assigned_to,
        category: payload.category,
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of status, priority, assigned_to or category is required".to_string(),
        ));
    }

    let ticket = state.tickets.update(&ticket_number, update).await?;
    tracing::info!(
        ticket_number = %ticket.ticket_number,
        status = %ticket.status,
        "ticket_updated"
    );
    Ok(Json(ticket))
}
