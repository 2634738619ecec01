use serde_json::{json, Value};

use super::webhook::WebhookNotifier;
use crate::core::errors::ApiError;
use crate::db::tickets::{NewTicket, Ticket};
use crate::db::TicketStore;
use crate::types::{Intent, TicketPriority};

pub const CREATE_TICKET: &str = "create_ticket";

const TITLE_CHARS: usize = 80;

/// What the pipeline knows about the customer when an action runs.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub session_id: String,
    pub message: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action_type: String,
    pub payload: Value,
    pub result: Value,
    pub ticket: Option<Ticket>,
    /// Set when the action itself could not be carried out.
    pub error: Option<String>,
}

/// Turns intents into side effects.
#[derive(Clone)]
pub struct ActionPlanner {
    tickets: TicketStore,
    notifier: WebhookNotifier,
}

impl ActionPlanner {
    pub fn new(tickets: TicketStore, notifier: WebhookNotifier) -> Self {
        Self { tickets, notifier }
    }

    /// Runs the action for `intent`, if it has one.
    pub async fn execute(&self, intent: Intent, ctx: &ActionContext) -> Option<ActionOutcome> {
        if !intent.requires_ticket() {
            return None;
        }

        let new_ticket = ticket_for(intent, ctx);
        let payload = json!({
            "title": new_ticket.title,
            "priority": new_ticket.priority,
            "category": new_ticket.category,
            "session_id": new_ticket.session_id,
        });

        match self.create_and_notify(new_ticket).await {
            Ok((ticket, notification)) => Some(ActionOutcome {
                action_type: CREATE_TICKET.to_string(),
                payload,
                result: json!({
                    "status": "created",
                    "ticket_number": ticket.ticket_number,
                    "notification": notification,
                }),
                ticket: Some(ticket),
                error: None,
            }),
            Err(err) => {
                tracing::error!(session_id = %ctx.session_id, error = %err, "ticket_creation_failed");
                Some(ActionOutcome {
                    action_type: CREATE_TICKET.to_string(),
                    payload,
                    result: json!({"status": "failed", "error": err.to_string()}),
                    ticket: None,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    async fn create_and_notify(&self, new_ticket: NewTicket) -> Result<(Ticket, Value), ApiError> {
        let ticket = self.tickets.create(new_ticket).await?;
        tracing::info!(
            ticket_number = %ticket.ticket_number,
            priority = %ticket.priority,
            "ticket_created"
        );
        let notification = self.notifier.ticket_created(&ticket).await;
        Ok((ticket, notification))
    }
}

fn ticket_for(intent: Intent, ctx: &ActionContext) -> NewTicket {
    let priority = match intent {
        Intent::Complaint | Intent::Escalation => TicketPriority::High,
        _ => TicketPriority::Medium,
    };
    let title: String = ctx.message.trim().chars().take(TITLE_CHARS).collect();

    NewTicket {
        title,
        description: Some(ctx.message.clone()),
        priority,
        category: Some(intent.as_str().to_string()),
        customer_email: ctx.customer_email.clone(),
        customer_name: ctx.customer_name.clone(),
        session_id: Some(ctx.session_id.clone()),
        metadata: Some(json!({"source": "support_pipeline"})),
    }
}
