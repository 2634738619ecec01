use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::core::security::API_KEY_HEADER;
use crate::db::tickets::Ticket;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound notifications to the n8n workflow engine.
#[derive(Clone)]
pub struct WebhookNotifier {
    base_url: Option<String>,
    api_key: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(ApiError::internal)?;

        let base_url = base_url.trim().trim_end_matches('/');
        Ok(Self {
            base_url: (!base_url.is_empty()).then(|| base_url.to_string()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client,
        })
    }

    /// Announce a new ticket. The outcome is returned as JSON for the audit
    /// trail; delivery problems never become errors.
    pub async fn ticket_created(&self, ticket: &Ticket) -> Value {
        let Some(base_url) = &self.base_url else {
            return json!({"status": "skipped", "reason": "N8N_WEBHOOK_URL is not configured"});
        };

        let url = format!("{}/ticket-created", base_url);
        let body = json!({
            "event": "ticket_created",
            "ticket": ticket,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        match request.send().await {
            Ok(res) if res.status().is_success() => {
                json!({"status": "sent", "http_status": res.status().as_u16()})
            }
            Ok(res) => {
                let status = res.status();
                tracing::warn!(url = %url, status = %status, "webhook_notification_rejected");
                json!({"status": "failed", "http_status": status.as_u16()})
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "webhook_notification_failed");
                json!({"status": "failed", "error": err.to_string()})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::{TicketPriority, TicketStatus};

    fn ticket() -> Ticket {
        Ticket {
            id: "id-1".to_string(),
            ticket_number: "TKT-20240101-ABC123".to_string(),
            title: "Broken blender".to_string(),
            description: None,
            priority: TicketPriority::High,
            status: TicketStatus::Open,
            category: Some("complaint".to_string()),
            customer_email: None,
            customer_name: None,
            assigned_to: None,
            session_id: Some("s-1".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_skipped() {
        let notifier = WebhookNotifier::new("  ", Some(String::new())).expect("notifier");
        let outcome = notifier.ticket_created(&ticket()).await;
        assert_eq!(outcome["status"], "skipped");
    }

    #[tokio::test]
    async fn unreachable_webhook_reports_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/webhook/", None).expect("notifier");
        let outcome = notifier.ticket_created(&ticket()).await;
        assert_eq!(outcome["status"], "failed");
    }
}
