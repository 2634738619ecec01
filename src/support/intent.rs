use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TokenUsage};
use crate::types::Intent;

const KEYWORD_CONFIDENCE: f64 = 0.5;

const CLASSIFIER_PROMPT: &str = "You classify customer support messages. \
Reply with a JSON object {\"intent\": <label>, \"confidence\": <number between 0 and 1>}. \
Allowed labels: greeting, question, order_status, complaint, ticket_request, escalation, \
feedback, other.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Llm,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentVerdict {
    pub intent: Intent,
    pub confidence: f64,
    pub source: VerdictSource,
    #[serde(skip)]
    pub usage: TokenUsage,
}

#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the chat model for a verdict, falling back to keyword rules when
    /// the call fails or the answer is unusable.
    pub async fn classify(&self, message: &str) -> IntentVerdict {
        let request = ChatRequest::new(vec![
            ChatMessage::system(CLASSIFIER_PROMPT),
            ChatMessage::user(message),
        ])
        .with_temperature(0.0)
        .with_max_tokens(50)
        .json();

        match self.llm.chat(request).await {
            Ok(completion) => match parse_verdict(&completion.content) {
                Some((intent, confidence)) => IntentVerdict {
                    intent,
                    confidence,
                    source: VerdictSource::Llm,
                    usage: completion.usage,
                },
                None => {
                    tracing::warn!(
                        response = %completion.content,
                        "intent_classification_unparseable"
                    );
                    IntentVerdict {
                        usage: completion.usage,
                        ..classify_keywords(message)
                    }
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "intent_classification_failed");
                classify_keywords(message)
            }
        }
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    intent: String,
    #[serde(default)]
    confidence: Option<Value>,
}

fn parse_verdict(content: &str) -> Option<(Intent, f64)> {
    let raw: RawVerdict = serde_json::from_str(content.trim()).ok()?;
    let intent = raw.intent.parse::<Intent>().ok()?;
    let confidence = match raw.confidence {
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        _ => KEYWORD_CONFIDENCE,
    };
    if !confidence.is_finite() {
        return None;
    }
    Some((intent, confidence.clamp(0.0, 1.0)))
}

fn keyword_rules() -> &'static [(Intent, Regex)] {
    static RULES: OnceLock<Vec<(Intent, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (
                Intent::Escalation,
                r"(?i)\b(manager|supervisor|escalate|escalation|human|real person|speak to (someone|somebody|an agent))\b",
            ),
            (
                Intent::Complaint,
                r"(?i)\b(complain|complaint|terrible|awful|unacceptable|angry|furious|worst|disappointed|broken|damaged)\b",
            ),
            (
                Intent::TicketRequest,
                r"(?i)\b(ticket|open a case|support request|report (a|an) (issue|problem|bug))\b",
            ),
            (
                Intent::OrderStatus,
                r"(?i)\b(order|orders|tracking|shipment|shipped|shipping status|delivery|package|parcel)\b",
            ),
            (
                Intent::Question,
                r"(?i)(\?\s*$|^\s*(what|how|why|when|where|who|which|can|could|do|does|is|are)\b)",
            ),
            (
                Intent::Feedback,
                r"(?i)\b(feedback|suggestion|suggest|great job|love (it|this|your)|thanks|thank you)\b",
            ),
            (
                Intent::Greeting,
                r"(?i)^\s*(hi|hello|hey|howdy|good (morning|afternoon|evening))\b",
            ),
        ]
        .into_iter()
        .filter_map(|(intent, pattern)| match Regex::new(pattern) {
            Ok(regex) => Some((intent, regex)),
            Err(err) => {
                tracing::error!(intent = %intent, error = %err, "invalid_intent_pattern");
                None
            }
        })
        .collect()
    })
}

/// Rule-based classification used when the model cannot be consulted.
pub fn classify_keywords(message: &str) -> IntentVerdict {
    let intent = keyword_rules()
        .iter()
        .find(|(_, pattern)| pattern.is_match(message))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Other);

    IntentVerdict {
        intent,
        confidence: KEYWORD_CONFIDENCE,
        source: VerdictSource::Keywords,
        usage: TokenUsage::default(),
    }
}
