//! End-to-end behaviour of the rule engine: store → match → resolve → dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use followup_actions::{
    ActionContext, ActionDispatcher, ActionHandler, DispatchLog, DispatchOutcome, FailureReason,
    HandlerError, HandlerRegistry, JsonFileDispatchStore,
};
use followup_core::{
    Action, ActionType, AddTagConfig, Condition, ConditionField, CreateTaskConfig,
    InteractionEvent, Operator, Priority, RuleDraft, SendEmailConfig,
};
use followup_engine::audit_log::{ExecutionPhase, LogQueryParams};
use followup_engine::{AuditLog, RuleEngine};
use followup_rules::{InMemoryRuleStore, RuleStore, StoreError, SuggestionIngestor};
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Records every call; fails or sleeps for selected action types.
#[derive(Default)]
struct RecordingHandler {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, ActionType)>>,
    fail: Option<ActionType>,
    /// Fails only the very first call, if it is of this type.
    fail_first: Option<ActionType>,
    sleep: Option<(ActionType, Duration)>,
}

#[async_trait::async_trait]
impl ActionHandler for RecordingHandler {
    async fn handle(&self, ctx: &ActionContext) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((ctx.rule_id.to_string(), ctx.action.kind()));
        if let Some((kind, d)) = self.sleep {
            if kind == ctx.action.kind() {
                tokio::time::sleep(d).await;
            }
        }
        if self.fail == Some(ctx.action.kind()) {
            return Err(HandlerError::Rejected("mail server down".to_string()));
        }
        if call == 0 && self.fail_first == Some(ctx.action.kind()) {
            return Err(HandlerError::Rejected("down".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

impl RecordingHandler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen_types(&self) -> Vec<ActionType> {
        self.seen.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

struct Harness {
    store: Arc<InMemoryRuleStore>,
    handler: Arc<RecordingHandler>,
    audit: Arc<AuditLog>,
    engine: RuleEngine,
}

fn harness_with(handler: RecordingHandler) -> Harness {
    let store = Arc::new(InMemoryRuleStore::new());
    let handler = Arc::new(handler);
    let audit = Arc::new(AuditLog::new());
    let dispatcher = ActionDispatcher::new(HandlerRegistry::with_fallback(handler.clone()));
    let engine = RuleEngine::new(store.clone(), dispatcher).with_sink(audit.clone());
    Harness {
        store,
        handler,
        audit,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(RecordingHandler::default())
}

fn tag(t: &str) -> Action {
    Action::AddTag(AddTagConfig {
        tag: Some(t.to_string()),
    })
}

fn task(title: &str) -> Action {
    Action::CreateTask(CreateTaskConfig {
        title: Some(title.to_string()),
        ..Default::default()
    })
}

fn email() -> Action {
    Action::SendEmail(SendEmailConfig {
        to: Some("manager@example.com".to_string()),
        ..Default::default()
    })
}

fn negative(id: &str) -> InteractionEvent {
    InteractionEvent::new(id)
        .with(ConditionField::Sentiment, "negative")
        .with(ConditionField::Channel, "voice")
}

// ── Scenario ────────────────────────────────────────────────────────

#[tokio::test]
async fn negative_sentiment_creates_task() {
    let h = harness();
    let rule_id = h
        .store
        .create(
            RuleDraft::new("Follow up on unhappy callers")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(Action::CreateTask(CreateTaskConfig::default()))
                .priority(Priority::High),
        )
        .unwrap();

    let result = h.engine.evaluate(&negative("e1")).await;

    assert_eq!(result.event_id, "e1");
    assert_eq!(result.matched_ids(), vec![&rule_id]);
    assert_eq!(result.action_types(), vec![ActionType::CreateTask]);
    assert_eq!(result.outcomes(), vec![&DispatchOutcome::Dispatched]);
    assert!(result.errors.is_empty());
    assert_eq!(h.handler.calls(), 1);
}

// ── Matching ────────────────────────────────────────────────────────

#[tokio::test]
async fn conditions_are_anded() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("negative voice")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .condition(Condition::equals(ConditionField::Channel, "voice"))
                .action(tag("angry-caller")),
        )
        .unwrap();

    let both = h.engine.evaluate(&negative("e1")).await;
    assert_eq!(both.matched_rules.len(), 1);

    let only_sentiment = InteractionEvent::new("e2").with(ConditionField::Sentiment, "negative");
    let result = h.engine.evaluate(&only_sentiment).await;
    assert!(result.matched_rules.is_empty());
    assert!(result.dispatched_actions.is_empty());
}

#[tokio::test]
async fn missing_field_never_matches() {
    let h = harness();
    for op in [Operator::Equals, Operator::NotEquals, Operator::Contains] {
        h.store
            .create(
                RuleDraft::new(format!("tier {op}"))
                    .condition(Condition::new(ConditionField::CustomerTier, op, "vip"))
                    .action(tag("tier")),
            )
            .unwrap();
    }

    let result = h.engine.evaluate(&negative("e1")).await;
    assert!(result.matched_rules.is_empty());
    assert_eq!(h.handler.calls(), 0);
}

#[tokio::test]
async fn disabled_rules_never_match() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("off")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("off"))
                .enabled(false),
        )
        .unwrap();

    let result = h.engine.evaluate(&negative("e1")).await;
    assert!(result.matched_rules.is_empty());
}

#[tokio::test]
async fn duration_conditions_use_seconds() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("ten minute calls")
                .condition(Condition::equals(ConditionField::Duration, "600"))
                .action(tag("long")),
        )
        .unwrap();

    let mut event = InteractionEvent::new("e1");
    event.duration = Some(600);
    assert_eq!(h.engine.evaluate(&event).await.matched_rules.len(), 1);

    event.id = "e2".to_string();
    event.duration = Some(601);
    assert!(h.engine.evaluate(&event).await.matched_rules.is_empty());
}

// ── Ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn high_priority_actions_run_first() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("R1")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("a1"))
                .priority(Priority::Low),
        )
        .unwrap();
    h.store
        .create(
            RuleDraft::new("R2")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(task("a2"))
                .priority(Priority::High),
        )
        .unwrap();

    let result = h.engine.evaluate(&negative("e1")).await;
    assert_eq!(
        result.action_types(),
        vec![ActionType::CreateTask, ActionType::AddTag]
    );
    assert_eq!(
        h.handler.seen_types(),
        vec![ActionType::CreateTask, ActionType::AddTag]
    );
    // Matched rules stay in store order.
    let names: Vec<&str> = result.matched_rules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["R1", "R2"]);
}

#[tokio::test]
async fn evaluation_is_deterministic() {
    let h = harness();
    for (name, priority) in [
        ("a", Priority::Medium),
        ("b", Priority::High),
        ("c", Priority::Medium),
        ("d", Priority::Low),
        ("e", Priority::High),
    ] {
        h.store
            .create(
                RuleDraft::new(name)
                    .condition(Condition::new(
                        ConditionField::Sentiment,
                        Operator::Contains,
                        "NEG",
                    ))
                    .action(tag(name))
                    .priority(priority),
            )
            .unwrap();
    }

    let first = h.engine.evaluate(&negative("e1")).await;
    let second = h.engine.evaluate(&negative("e2")).await;

    let order = |r: &followup_engine::EvaluationResult| -> Vec<String> {
        r.dispatched_actions
            .iter()
            .map(|a| a.rule_name.clone())
            .collect()
    };
    assert_eq!(first.matched_ids(), second.matched_ids());
    assert_eq!(order(&first), order(&second));
    assert_eq!(order(&first), vec!["b", "e", "a", "c", "d"]);
    assert_eq!(h.engine.preview(&negative("e3")).plan.len(), 5);
}

// ── Idempotency ─────────────────────────────────────────────────────

#[tokio::test]
async fn replaying_an_event_skips_dispatched_actions() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("tag")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("angry")),
        )
        .unwrap();

    let first = h.engine.evaluate(&negative("e1")).await;
    let replay = h.engine.evaluate(&negative("e1")).await;

    assert_eq!(first.outcomes(), vec![&DispatchOutcome::Dispatched]);
    assert_eq!(replay.outcomes(), vec![&DispatchOutcome::SkippedDuplicate]);
    assert_eq!(
        first.dispatched_actions[0].idempotency_key,
        replay.dispatched_actions[0].idempotency_key
    );
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test]
async fn identical_actions_across_rules_dispatch_once() {
    let h = harness();
    for (name, priority) in [("low", Priority::Low), ("high", Priority::High)] {
        h.store
            .create(
                RuleDraft::new(name)
                    .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                    .action(tag("vip"))
                    .priority(priority),
            )
            .unwrap();
    }

    let result = h.engine.evaluate(&negative("e1")).await;
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(
        result.outcomes(),
        vec![&DispatchOutcome::Dispatched, &DispatchOutcome::SkippedDuplicate]
    );
    assert_eq!(result.dispatched_actions[0].rule_name, "high");
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test]
async fn concurrent_replays_dispatch_once() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("tag")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("angry")),
        )
        .unwrap();

    let events: Vec<InteractionEvent> = (0..6).map(|_| negative("same")).collect();
    let results = h.engine.evaluate_all(events, 6).await;

    let dispatched: usize = results.iter().map(|r| r.count(|o| o.is_dispatched())).sum();
    assert_eq!(dispatched, 1);
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test]
async fn concurrent_replay_retries_when_first_attempt_fails() {
    let h = harness_with(RecordingHandler {
        fail_first: Some(ActionType::AddTag),
        sleep: Some((ActionType::AddTag, Duration::from_millis(50))),
        ..Default::default()
    });
    h.store
        .create(
            RuleDraft::new("tag")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("angry")),
        )
        .unwrap();

    let results = h.engine.evaluate_all(vec![negative("e1"), negative("e1")], 2).await;
    let outcomes: Vec<&DispatchOutcome> = results.iter().flat_map(|r| r.outcomes()).collect();

    // The waiting evaluation must not report a duplicate of a failed attempt.
    assert!(!outcomes.contains(&&DispatchOutcome::SkippedDuplicate));
    assert_eq!(outcomes.iter().filter(|o| o.is_failed()).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.is_dispatched()).count(), 1);
    assert_eq!(h.handler.calls(), 2);
}

#[tokio::test]
async fn replay_after_deadline_does_not_repeat_side_effect() {
    let h = harness_with(RecordingHandler {
        sleep: Some((ActionType::AddTag, Duration::from_millis(100))),
        ..Default::default()
    });
    h.store
        .create(
            RuleDraft::new("tag")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("angry")),
        )
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_millis(20);
    let first = h.engine.evaluate_with_deadline(&negative("e1"), Some(deadline)).await;
    let replay = h.engine.evaluate(&negative("e1")).await;

    assert_eq!(
        first.outcomes(),
        vec![&DispatchOutcome::failed(FailureReason::DeadlineExceeded)]
    );
    assert_eq!(replay.outcomes(), vec![&DispatchOutcome::SkippedDuplicate]);
    assert_eq!(h.handler.calls(), 1);
}

#[tokio::test]
async fn replay_after_restart_skips_with_durable_log() {
    let tmp = TempDir::new().unwrap();
    let log_path = tmp.path().join("dispatch.json");
    let store = Arc::new(InMemoryRuleStore::new());
    store
        .create(
            RuleDraft::new("tag")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("angry")),
        )
        .unwrap();
    let handler = Arc::new(RecordingHandler::default());

    let start_engine = || {
        let log = DispatchLog::open(JsonFileDispatchStore::new(&log_path).unwrap()).unwrap();
        let dispatcher = ActionDispatcher::with_log(
            HandlerRegistry::with_fallback(handler.clone()),
            Arc::new(log),
        );
        RuleEngine::new(store.clone(), dispatcher)
    };

    let engine = start_engine();
    let first = engine.evaluate(&negative("e1")).await;
    drop(engine);

    let restarted = start_engine();
    let replay = restarted.evaluate(&negative("e1")).await;

    assert_eq!(first.outcomes(), vec![&DispatchOutcome::Dispatched]);
    assert_eq!(replay.outcomes(), vec![&DispatchOutcome::SkippedDuplicate]);
    assert_eq!(handler.calls(), 1);
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_handler_does_not_block_other_actions() {
    let h = harness_with(RecordingHandler {
        fail: Some(ActionType::SendEmail),
        ..Default::default()
    });
    h.store
        .create(
            RuleDraft::new("escalate")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(email())
                .action(tag("escalated"))
                .priority(Priority::High),
        )
        .unwrap();

    let result = h.engine.evaluate(&negative("e1")).await;

    match &result.dispatched_actions[0].outcome {
        DispatchOutcome::Failed {
            reason: FailureReason::HandlerError(msg),
        } => assert!(msg.contains("mail server down")),
        other => panic!("expected handler failure, got {other:?}"),
    }
    assert_eq!(result.dispatched_actions[1].outcome, DispatchOutcome::Dispatched);

    let entries = h.audit.query(
        &result.dispatched_actions[0].rule_id,
        &LogQueryParams {
            phase: Some(ExecutionPhase::DispatchError),
            ..Default::default()
        },
    );
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn unregistered_action_type_fails_in_isolation() {
    let store = Arc::new(InMemoryRuleStore::new());
    let handler = Arc::new(RecordingHandler::default());
    let registry = HandlerRegistry::new().with(ActionType::AddTag, handler.clone());
    let engine = RuleEngine::new(store.clone(), ActionDispatcher::new(registry));

    store
        .create(
            RuleDraft::new("mixed")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(Action::TriggerWorkflow(Default::default()))
                .action(tag("ok")),
        )
        .unwrap();

    let result = engine.evaluate(&negative("e1")).await;
    assert_eq!(
        result.outcomes(),
        vec![
            &DispatchOutcome::failed(FailureReason::UnknownActionType),
            &DispatchOutcome::Dispatched,
        ]
    );
}

#[tokio::test]
async fn deadline_fails_remaining_actions() {
    let h = harness_with(RecordingHandler {
        sleep: Some((ActionType::SendEmail, Duration::from_millis(200))),
        ..Default::default()
    });
    h.store
        .create(
            RuleDraft::new("slow")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("first"))
                .action(email())
                .action(tag("last")),
        )
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_millis(50);
    let result = h.engine.evaluate_with_deadline(&negative("e1"), Some(deadline)).await;

    assert_eq!(
        result.outcomes(),
        vec![
            &DispatchOutcome::Dispatched,
            &DispatchOutcome::failed(FailureReason::DeadlineExceeded),
            &DispatchOutcome::failed(FailureReason::DeadlineExceeded),
        ]
    );
    assert_eq!(result.dispatched_actions.len(), 3);
}

// ── Store and drafts ────────────────────────────────────────────────

#[tokio::test]
async fn invalid_rules_are_rejected_and_not_stored() {
    let h = harness();

    let no_conditions = RuleDraft::new("nothing to check").action(tag("x"));
    let no_actions =
        RuleDraft::new("nothing to do").condition(Condition::equals(ConditionField::Sentiment, "negative"));

    assert!(matches!(
        h.store.create(no_conditions),
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(h.store.create(no_actions), Err(StoreError::Validation(_))));
    assert!(h.store.list().unwrap().is_empty());

    let result = h.engine.evaluate(&negative("e1")).await;
    assert!(result.matched_rules.is_empty());
}

#[tokio::test]
async fn ingested_drafts_stay_inactive_until_approved() {
    let h = harness();
    let ingestor = SuggestionIngestor::new(h.store.clone());

    let rules = ingestor.ingest(vec![RuleDraft::new("AI: tag angry callers")
        .condition(Condition::equals(ConditionField::Sentiment, "negative"))
        .action(tag("ai"))
        .enabled(true)]);
    assert_eq!(rules.len(), 1);
    assert!(!rules[0].enabled);

    assert!(h.engine.evaluate(&negative("e1")).await.matched_rules.is_empty());

    h.store.set_enabled(&rules[0].id, true).unwrap();
    assert_eq!(h.engine.evaluate(&negative("e2")).await.matched_rules.len(), 1);
}

#[tokio::test]
async fn yaml_rules_drive_the_engine() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("churn.yml"),
        r#"
name: Save high churn risk
priority: high
conditions:
  - type: churn_risk
    operator: equals
    value: high
actions:
  - type: schedule_followup
    config:
      delay_hours: 24
      channel: voice
"#,
    )
    .unwrap();

    let h = harness();
    let loader = followup_rules::loader::RuleLoader::new(dir.path().to_path_buf(), h.store.clone());
    loader.load_all().unwrap();

    let event = InteractionEvent::new("e1").with(ConditionField::ChurnRisk, "high");
    let result = h.engine.evaluate(&event).await;
    assert_eq!(result.action_types(), vec![ActionType::ScheduleFollowup]);
    assert_eq!(result.outcomes(), vec![&DispatchOutcome::Dispatched]);
}

#[tokio::test]
async fn results_serialize_for_the_audit_trail() {
    let h = harness();
    h.store
        .create(
            RuleDraft::new("tag")
                .condition(Condition::equals(ConditionField::Sentiment, "negative"))
                .action(tag("angry")),
        )
        .unwrap();

    let result = h.engine.evaluate(&negative("e1")).await;
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["eventId"], "e1");
    assert_eq!(json["dispatchedActions"][0]["outcome"]["status"], "dispatched");
    assert_eq!(json["dispatchedActions"][0]["action"]["type"], "add_tag");

    let back: followup_engine::EvaluationResult = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
}
