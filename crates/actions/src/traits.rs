//! Action handler trait definition and shared error types.

use followup_core::{Action, RuleId};
use serde::Serialize;

/// Errors an action handler can report.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The downstream system refused the action.
    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Everything a handler gets to know about the action it runs.
#[derive(Debug, Clone, Serialize)]
pub struct ActionContext {
    pub event_id: String,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: Action,
}

/// Performs the side effect behind one or more action types.
///
/// Handlers own their retry policy; the dispatcher calls each at most once
/// per idempotency key and records whatever comes back.
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: &ActionContext) -> Result<(), HandlerError>;

    /// Human-readable name for this handler (e.g., "log", "webhook").
    fn name(&self) -> &str;
}
