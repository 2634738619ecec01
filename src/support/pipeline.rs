use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::actions::{ActionContext, ActionPlanner};
use super::intent::IntentClassifier;
use super::prompt::build_prompt;
use crate::core::errors::{panic_message, ApiError};
use crate::db::audit::NewAuditLog;
use crate::db::{AuditStore, MemoryStore};
use crate::llm::{LlmProvider, TokenUsage};
use crate::rag::{RetrievedSource, Retriever};
use crate::types::{Intent, MessageType};

const MAX_MESSAGE_CHARS: usize = 10_000;

/// A customer message from the chat API or the n8n webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportReply {
    pub session_id: String,
    pub response: String,
    pub intent: Intent,
    pub confidence: f64,
    pub sources: Vec<SourceRef>,
    pub ticket_number: Option<String>,
    pub action: Option<String>,
    pub audit_id: String,
    pub latency_ms: i64,
    pub token_count: i64,
}

/// Fields of the reply that are known before the audit row is written.
struct Drafted {
    response: String,
    intent: Intent,
    confidence: f64,
    sources: Vec<SourceRef>,
    ticket_number: Option<String>,
    action: Option<String>,
}

/// Memory, retrieval, classification, generation and actions for one
/// customer message. Each call to [`SupportPipeline::handle`] leaves exactly
/// one audit row behind, whether it succeeds or fails.
#[derive(Clone)]
pub struct SupportPipeline {
    llm: Arc<dyn LlmProvider>,
    retriever: Retriever,
    classifier: IntentClassifier,
    planner: ActionPlanner,
    memory: MemoryStore,
    audit: AuditStore,
    memory_window: i64,
    memory_ttl: Duration,
}

impl SupportPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        retriever: Retriever,
        classifier: IntentClassifier,
        planner: ActionPlanner,
        memory: MemoryStore,
        audit: AuditStore,
        memory_window: i64,
        memory_ttl: Duration,
    ) -> Self {
        Self {
            llm,
            retriever,
            classifier,
            planner,
            memory,
            audit,
            memory_window,
            memory_ttl,
        }
    }

    /// Runs one interaction on its own task.
    ///
    /// The task keeps going when the caller stops waiting (client disconnect,
    /// request timeout), so the audit row is still written. A panic inside the
    /// task is audited here and surfaces as an internal error.
    pub async fn handle(
        &self,
        incoming: IncomingMessage,
        message_type: MessageType,
    ) -> Result<SupportReply, ApiError> {
        validate(&incoming)?;

        let started = Instant::now();
        let session_id = incoming
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let pipeline = self.clone();
        let task_session = session_id.clone();
        let task_incoming = incoming.clone();
        let task = tokio::spawn(async move {
            pipeline
                .complete(task_session, task_incoming, message_type, started)
                .await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let detail = if join_err.is_panic() {
                    panic_message(&*join_err.into_panic())
                } else {
                    join_err.to_string()
                };

                let mut entry = audit_entry(&session_id, &incoming, message_type);
                entry.latency_ms = Some(started.elapsed().as_millis() as i64);
                entry.error_message = Some(format!("interaction aborted: {}", detail));
                if let Err(audit_err) = self.audit.record(entry).await {
                    tracing::error!(
                        session_id = %session_id,
                        error = %audit_err,
                        "audit_write_failed"
                    );
                }
                tracing::error!(
                    session_id = %session_id,
                    message_type = %message_type,
                    error = %detail,
                    "interaction_aborted"
                );
                Err(ApiError::Internal(detail))
            }
        }
    }

    async fn complete(
        &self,
        session_id: String,
        incoming: IncomingMessage,
        message_type: MessageType,
        started: Instant,
    ) -> Result<SupportReply, ApiError> {
        let mut entry = audit_entry(&session_id, &incoming, message_type);
        let mut usage = TokenUsage::default();

        let outcome = self
            .run(&session_id, &incoming, &mut entry, &mut usage)
            .await;

        let latency_ms = started.elapsed().as_millis() as i64;
        entry.latency_ms = Some(latency_ms);
        entry.token_count = Some(usage.total_tokens);

        match outcome {
            Ok(drafted) => {
                let record = self.audit.record(entry).await?;
                tracing::info!(
                    session_id = %session_id,
                    message_type = %message_type,
                    intent = %drafted.intent,
                    latency_ms,
                    tokens = usage.total_tokens,
                    "interaction_completed"
                );

                Ok(SupportReply {
                    session_id,
                    response: drafted.response,
                    intent: drafted.intent,
                    confidence: drafted.confidence,
                    sources: drafted.sources,
                    ticket_number: drafted.ticket_number,
                    action: drafted.action,
                    audit_id: record.id,
                    latency_ms,
                    token_count: usage.total_tokens,
                })
            }
            Err(err) => {
                entry.error_message = Some(err.to_string());
                if let Err(audit_err) = self.audit.record(entry).await {
                    tracing::error!(
                        session_id = %session_id,
                        error = %audit_err,
                        "audit_write_failed"
                    );
                }
                tracing::error!(
                    session_id = %session_id,
                    message_type = %message_type,
                    error = %err,
                    "interaction_failed"
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        session_id: &str,
        incoming: &IncomingMessage,
        entry: &mut NewAuditLog,
        usage: &mut TokenUsage,
    ) -> Result<Drafted, ApiError> {
        let message = incoming.message.trim();

        let history = self
            .memory
            .recent(session_id, self.memory_window, Utc::now())
            .await?;

        let sources = match self.retriever.retrieve(message).await {
            Ok(sources) => sources,
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "retrieval_failed");
                Vec::new()
            }
        };
        entry.retrieved_sources = Some(sources_json(&sources));

        let verdict = self.classifier.classify(message).await;
        *usage = *usage + verdict.usage;
        entry.intent = Some(verdict.intent);

        let request = build_prompt(message, &sources, &history);
        entry.llm_prompt = Some(request.render());
        let completion = self.llm.chat(request).await?;
        *usage = *usage + completion.usage;
        entry.llm_response = Some(completion.content.clone());

        let mut response = completion.content;
        let mut ticket_number = None;
        let mut action = None;

        let ctx = ActionContext {
            session_id: session_id.to_string(),
            message: message.to_string(),
            customer_email: incoming.customer_email.clone(),
            customer_name: incoming.customer_name.clone(),
        };
        if let Some(outcome) = self.planner.execute(verdict.intent, &ctx).await {
            entry.action_type = Some(outcome.action_type.clone());
            entry.action_payload = Some(outcome.payload);
            entry.action_result = Some(outcome.result);
            entry.error_message = outcome.error;
            if let Some(ticket) = outcome.ticket {
                response.push_str(&format!(
                    "\n\nI've opened support ticket {} for you. Our team will follow up shortly.",
                    ticket.ticket_number
                ));
                ticket_number = Some(ticket.ticket_number);
            }
            action = Some(outcome.action_type);
        }

        self.memory
            .append_exchange(
                session_id,
                incoming.user_id.as_deref(),
                message,
                &response,
                Some(self.memory_ttl),
            )
            .await?;

        Ok(Drafted {
            response,
            intent: verdict.intent,
            confidence: verdict.confidence,
            sources: sources
                .iter()
                .map(|s| SourceRef {
                    source: s.source.clone(),
                    score: s.score,
                })
                .collect(),
            ticket_number,
            action,
        })
    }
}

fn audit_entry(
    session_id: &str,
    incoming: &IncomingMessage,
    message_type: MessageType,
) -> NewAuditLog {
    let mut entry = NewAuditLog::new(session_id.to_string(), message_type);
    entry.user_id = incoming.user_id.clone();
    entry.user_message = Some(incoming.message.clone());
    entry.metadata = incoming.metadata.clone();
    entry
}

fn validate(incoming: &IncomingMessage) -> Result<(), ApiError> {
    let message = incoming.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message must be at most {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    for (field, value) in [
        ("session_id", &incoming.session_id),
        ("user_id", &incoming.user_id),
        ("customer_email", &incoming.customer_email),
        ("customer_name", &incoming.customer_name),
    ] {
        if value.as_ref().is_some_and(|v| v.chars().count() > 255) {
            return Err(ApiError::BadRequest(format!(
                "{} must be at most 255 characters",
                field
            )));
        }
    }
    Ok(())
}

fn sources_json(sources: &[RetrievedSource]) -> Value {
    Value::Array(
        sources
            .iter()
            .map(|s| json!({"chunk_id": s.chunk_id, "source": s.source, "score": s.score}))
            .collect(),
    )
}
