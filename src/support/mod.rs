//! Customer conversation handling.

pub mod actions;
pub mod intent;
pub mod pipeline;
pub mod prompt;
pub mod reaper;
pub mod webhook;

pub use actions::{ActionContext, ActionOutcome, ActionPlanner};
pub use intent::{classify_keywords, IntentClassifier, IntentVerdict};
pub use pipeline::{IncomingMessage, SupportPipeline, SupportReply};
pub use prompt::build_prompt;
pub use reaper::{reap_once, spawn_memory_reaper};
pub use webhook::WebhookNotifier;
