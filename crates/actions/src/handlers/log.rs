//! Handler that records the action through `tracing` and succeeds.

use crate::traits::{ActionContext, ActionHandler, HandlerError};

/// Logs every action it receives. Used by the worker when no real
/// integration is configured, and in dry runs against production rules.
#[derive(Debug, Default)]
pub struct LogHandler;

impl LogHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ActionHandler for LogHandler {
    async fn handle(&self, ctx: &ActionContext) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = %ctx.event_id,
            rule_id = %ctx.rule_id,
            rule_name = %ctx.rule_name,
            action_type = %ctx.action.kind(),
            config = %ctx.action.canonical_config(),
            "action"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
