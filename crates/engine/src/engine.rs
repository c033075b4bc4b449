//! The per-event evaluation pipeline.
//!
//! ```text
//! InteractionEvent ─► load active rules ─► match (per rule, isolated)
//!                  ─► resolve (priority order) ─► dispatch ─► EvaluationResult
//! ```
//!
//! Load, match and resolve are pure with respect to the outside world; the
//! only side effects happen in dispatch. Every call returns a well-formed
//! [`EvaluationResult`]: store failures and panicking rules are recorded in
//! `errors` instead of aborting the evaluation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use followup_actions::{idempotency_key, ActionContext, ActionDispatcher};
use followup_core::{EngineConfig, InteractionEvent, Rule};
use followup_rules::resolver::resolve;
use followup_rules::{rule_matches, RuleStore};

use crate::audit_log::AuditSink;
use crate::result::{ActionRecord, EvaluationError, EvaluationResult, MatchedRule, Preview};

type Matcher = fn(&Rule, &InteractionEvent) -> bool;

/// Orchestrates rule evaluation for a stream of independent events.
///
/// Cheap to share behind an `Arc`; concurrent `evaluate` calls for
/// different events do not coordinate beyond the store and dispatch log.
pub struct RuleEngine {
    store: Arc<dyn RuleStore>,
    dispatcher: ActionDispatcher,
    sinks: Vec<Arc<dyn AuditSink>>,
    default_deadline: Option<Duration>,
    matcher: Matcher,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn RuleStore>, dispatcher: ActionDispatcher) -> Self {
        Self {
            store,
            dispatcher,
            sinks: Vec::new(),
            default_deadline: None,
            matcher: rule_matches,
        }
    }

    /// Apply engine settings (dispatch deadline) from config.
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_default_deadline(config.dispatch_deadline())
    }

    /// Deadline applied by [`evaluate`](Self::evaluate), measured from the
    /// start of each call.
    pub fn with_default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Forward every result to `sink` after evaluation.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Evaluate one event using the engine's default deadline.
    pub async fn evaluate(&self, event: &InteractionEvent) -> EvaluationResult {
        let deadline = self.default_deadline.map(|d| Instant::now() + d);
        self.evaluate_with_deadline(event, deadline).await
    }

    /// Evaluate one event. Actions not started by `deadline` are reported as
    /// `failed: deadline_exceeded`; actions already dispatched stay dispatched.
    pub async fn evaluate_with_deadline(
        &self,
        event: &InteractionEvent,
        deadline: Option<Instant>,
    ) -> EvaluationResult {
        let start = StdInstant::now();
        let evaluated_at = Utc::now();
        let mut errors = Vec::new();

        let matched = self.load_and_match(event, &mut errors);
        let resolution = resolve(&matched);

        let mut dispatched_actions = Vec::with_capacity(resolution.plan.len());
        for step in resolution.plan {
            let ctx = ActionContext {
                event_id: event.id.clone(),
                rule_id: step.rule_id,
                rule_name: step.rule_name,
                action: step.action,
            };
            let outcome = self.dispatcher.dispatch_until(&ctx, deadline).await;
            dispatched_actions.push(ActionRecord {
                idempotency_key: idempotency_key(&ctx.event_id, &ctx.action),
                rule_id: ctx.rule_id,
                rule_name: ctx.rule_name,
                action_index: step.action_index,
                action: ctx.action,
                outcome,
            });
        }

        let result = EvaluationResult {
            event_id: event.id.clone(),
            evaluated_at,
            matched_rules: summarize(&matched),
            dispatched_actions,
            conflicts: resolution.conflicts,
            errors,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            event_id = %result.event_id,
            matched = result.matched_rules.len(),
            dispatched = result.count(|o| o.is_dispatched()),
            failed = result.count(|o| o.is_failed()),
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "event evaluated"
        );

        for sink in &self.sinks {
            sink.record(&result);
        }
        result
    }

    /// Dry run: which actions would run for `event`, in order, without
    /// dispatching anything. Store failures and panicking rules show up in
    /// `errors`, as they do for a real evaluation.
    pub fn preview(&self, event: &InteractionEvent) -> Preview {
        let mut errors = Vec::new();
        let matched = self.load_and_match(event, &mut errors);
        let resolution = resolve(&matched);
        Preview {
            event_id: event.id.clone(),
            matched_rules: summarize(&matched),
            plan: resolution.plan,
            conflicts: resolution.conflicts,
            errors,
        }
    }

    /// Evaluate independent events with at most `concurrency` in flight.
    /// Results come back in input order.
    pub async fn evaluate_all(
        &self,
        events: Vec<InteractionEvent>,
        concurrency: usize,
    ) -> Vec<EvaluationResult> {
        stream::iter(events)
            .map(|event| async move { self.evaluate(&event).await })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    fn load_and_match(&self, event: &InteractionEvent, errors: &mut Vec<EvaluationError>) -> Vec<Rule> {
        let rules = match self.store.list_active() {
            Ok(rules) => rules,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "failed to load active rules");
                errors.push(EvaluationError::StoreUnavailable {
                    message: e.to_string(),
                });
                return Vec::new();
            }
        };

        let matcher = self.matcher;
        let mut matched = Vec::new();
        for rule in rules {
            match catch_unwind(AssertUnwindSafe(|| matcher(&rule, event))) {
                Ok(true) => {
                    debug!(event_id = %event.id, rule_id = %rule.id, "rule matched");
                    matched.push(rule);
                }
                Ok(false) => {}
                Err(_) => {
                    warn!(event_id = %event.id, rule_id = %rule.id, "rule evaluation panicked, skipping rule");
                    errors.push(EvaluationError::RulePanicked { rule_id: rule.id });
                }
            }
        }
        matched
    }
}

fn summarize(matched: &[Rule]) -> Vec<MatchedRule> {
    matched
        .iter()
        .map(|r| MatchedRule {
            rule_id: r.id.clone(),
            name: r.name.clone(),
            priority: r.priority,
        })
        .collect()
}
