//! Runs a single action through its registered handler.
//!
//! Each dispatch is isolated: an unknown action type, a handler error, a
//! panicking handler or an expired deadline becomes a `failed` outcome for
//! that action only. Duplicate `(event, type, config)` triples are skipped
//! before the handler is reached.
//!
//! Handlers run on their own task. A deadline only stops the caller from
//! waiting; the handler keeps running and its real outcome is still
//! recorded in the dispatch log, so a replay never starts it a second time.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use followup_core::{Action, Rule};

use crate::dispatch_log::{idempotency_key, Claim, ClaimGuard, DispatchLog};
use crate::registry::HandlerRegistry;
use crate::traits::{ActionContext, ActionHandler};

/// Why a dispatch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    UnknownActionType,
    DeadlineExceeded,
    HandlerError(String),
    HandlerPanicked,
    /// An earlier attempt started the handler but never reported back, so
    /// it is not started again.
    InDoubt,
    /// The claim could not be recorded; the handler was not started.
    DispatchLogUnavailable(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UnknownActionType => f.write_str("unknown_action_type"),
            FailureReason::DeadlineExceeded => f.write_str("deadline_exceeded"),
            FailureReason::HandlerError(msg) => write!(f, "handler_error: {msg}"),
            FailureReason::HandlerPanicked => f.write_str("handler_panicked"),
            FailureReason::InDoubt => f.write_str("in_doubt"),
            FailureReason::DispatchLogUnavailable(msg) => {
                write!(f, "dispatch_log_unavailable: {msg}")
            }
        }
    }
}

/// Per-action result recorded in the evaluation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched,
    SkippedDuplicate,
    Failed { reason: FailureReason },
}

impl DispatchOutcome {
    pub fn failed(reason: FailureReason) -> Self {
        DispatchOutcome::Failed { reason }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }
}

/// Executes actions against a [`HandlerRegistry`], at most once per key.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    registry: HandlerRegistry,
    log: Arc<DispatchLog>,
}

impl ActionDispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::with_log(registry, Arc::new(DispatchLog::new()))
    }

    /// Use an existing (possibly durable) dispatch log.
    pub fn with_log(registry: HandlerRegistry, log: Arc<DispatchLog>) -> Self {
        Self { registry, log }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn log(&self) -> &Arc<DispatchLog> {
        &self.log
    }

    /// Dispatch one action of `rule` for `event_id`, with no deadline.
    pub async fn dispatch(&self, event_id: &str, rule: &Rule, action: &Action) -> DispatchOutcome {
        let ctx = ActionContext {
            event_id: event_id.to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            action: action.clone(),
        };
        self.dispatch_until(&ctx, None).await
    }

    /// Dispatch with an optional deadline.
    ///
    /// Once the deadline has passed no handler is started. When another
    /// evaluation holds the key, this waits (until the deadline) for its
    /// outcome: skipped if it succeeded, retried here if it failed. A
    /// handler still running at the deadline is reported as
    /// `deadline_exceeded` but finishes in the background.
    pub async fn dispatch_until(&self, ctx: &ActionContext, deadline: Option<Instant>) -> DispatchOutcome {
        let action_type = ctx.action.kind();

        let Some(handler) = self.registry.get(action_type) else {
            tracing::warn!(
                event_id = %ctx.event_id,
                rule_id = %ctx.rule_id,
                action_type = %action_type,
                "no handler registered for action type"
            );
            return DispatchOutcome::failed(FailureReason::UnknownActionType);
        };

        let key = idempotency_key(&ctx.event_id, &ctx.action);
        let guard = loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(
                    event_id = %ctx.event_id,
                    rule_id = %ctx.rule_id,
                    action_type = %action_type,
                    "deadline passed before dispatch"
                );
                return DispatchOutcome::failed(FailureReason::DeadlineExceeded);
            }

            let claim = match self.log.claim(&key) {
                Ok(claim) => claim,
                Err(e) => {
                    tracing::error!(
                        event_id = %ctx.event_id,
                        rule_id = %ctx.rule_id,
                        action_type = %action_type,
                        error = %e,
                        "failed to record dispatch claim"
                    );
                    return DispatchOutcome::failed(FailureReason::DispatchLogUnavailable(e.to_string()));
                }
            };

            match claim {
                Claim::Acquired(guard) => break guard,
                Claim::AlreadyDispatched => {
                    tracing::debug!(
                        event_id = %ctx.event_id,
                        rule_id = %ctx.rule_id,
                        action_type = %action_type,
                        key = %key,
                        "skipping duplicate action"
                    );
                    return DispatchOutcome::SkippedDuplicate;
                }
                Claim::InDoubt => {
                    tracing::warn!(
                        event_id = %ctx.event_id,
                        rule_id = %ctx.rule_id,
                        action_type = %action_type,
                        key = %key,
                        "earlier dispatch outcome unknown, not starting handler again"
                    );
                    return DispatchOutcome::failed(FailureReason::InDoubt);
                }
                Claim::InFlight(pending) => {
                    tracing::debug!(
                        event_id = %ctx.event_id,
                        rule_id = %ctx.rule_id,
                        action_type = %action_type,
                        key = %key,
                        "waiting for in-flight dispatch"
                    );
                    match deadline {
                        Some(d) => {
                            // On timeout the loop reports the deadline.
                            let _ = tokio::time::timeout_at(d, pending.wait()).await;
                        }
                        None => pending.wait().await,
                    }
                }
            }
        };

        let mut task = tokio::spawn(run_handler(
            Arc::clone(handler),
            ctx.clone(),
            Arc::clone(&self.log),
            guard,
        ));

        let joined = match deadline {
            Some(d) => match tokio::time::timeout_at(d, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(
                        event_id = %ctx.event_id,
                        rule_id = %ctx.rule_id,
                        action_type = %action_type,
                        "deadline passed while handler was running; it continues in the background"
                    );
                    return DispatchOutcome::failed(FailureReason::DeadlineExceeded);
                }
            },
            None => task.await,
        };

        match joined {
            Ok(None) => DispatchOutcome::Dispatched,
            Ok(Some(reason)) => DispatchOutcome::failed(reason),
            Err(e) if e.is_panic() => DispatchOutcome::failed(FailureReason::HandlerPanicked),
            Err(_) => DispatchOutcome::failed(FailureReason::HandlerError(
                "handler task cancelled".to_string(),
            )),
        }
    }
}

/// Run the handler to completion and record its outcome against `guard`.
/// Returns the failure reason, if any.
async fn run_handler(
    handler: Arc<dyn ActionHandler>,
    ctx: ActionContext,
    log: Arc<DispatchLog>,
    guard: ClaimGuard,
) -> Option<FailureReason> {
    let action_type = ctx.action.kind();
    let start = StdInstant::now();
    let result = AssertUnwindSafe(handler.handle(&ctx)).catch_unwind().await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let reason = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(FailureReason::HandlerError(e.to_string())),
        Err(_panic) => Some(FailureReason::HandlerPanicked),
    };

    let recorded = match &reason {
        None => {
            tracing::info!(
                event_id = %ctx.event_id,
                rule_id = %ctx.rule_id,
                action_type = %action_type,
                handler = handler.name(),
                duration_ms,
                "action dispatched"
            );
            log.complete(guard)
        }
        Some(reason) => {
            tracing::warn!(
                event_id = %ctx.event_id,
                rule_id = %ctx.rule_id,
                action_type = %action_type,
                handler = handler.name(),
                reason = %reason,
                duration_ms,
                "action dispatch failed"
            );
            log.release(guard)
        }
    };
    if let Err(e) = recorded {
        tracing::error!(
            event_id = %ctx.event_id,
            action_type = %action_type,
            error = %e,
            "failed to record dispatch outcome"
        );
    }

    reason
}
