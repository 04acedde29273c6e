use chrono::{Duration, Utc};
use crewboard_shared::{collections, NotificationKind, TaskPriority, TaskStatus};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::notifications::{MockNotifier, NotificationOutcome};
use crate::store::{MemoryStore, RecordStore, Repository};
use crate::tests::fixtures::TaskFixture;
use crate::tests::helpers::TestContext;
use crate::workflows::presets::REVIEW_BOUNCE_ID;
use crate::workflows::triggers::task_payload;
use crate::workflows::{Condition, RuleAction, TriggerType, WorkflowEngine, WorkflowRule};

async fn add_rule(ctx: &TestContext, rule: &WorkflowRule) {
    ctx.seed(collections::WORKFLOW_RULES, std::slice::from_ref(rule)).await;
}

#[tokio::test]
async fn test_rules_run_in_descending_priority() {
    let ctx = TestContext::new();
    let task = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    // Both write the same field; the lower priority one runs last and wins.
    add_rule(
        &ctx,
        &WorkflowRule::new("low", TriggerType::Manual)
            .with_action(RuleAction::update_field("stage", json!("low")))
            .with_priority(1),
    )
    .await;
    add_rule(
        &ctx,
        &WorkflowRule::new("high", TriggerType::Manual)
            .with_action(RuleAction::update_field("stage", json!("high")))
            .with_priority(10),
    )
    .await;

    let summary = ctx
        .automation
        .execute_workflow(TriggerType::Manual, &task_payload(&task), None)
        .await;

    assert_eq!(summary.rules_evaluated, 2);
    assert_eq!(summary.rules_matched, 2);
    assert_eq!(summary.actions_applied, 2);

    let stored = ctx
        .store
        .get(collections::TASKS, task.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["stage"], "low");
}

#[tokio::test]
async fn test_conditions_and_enabled_flag_filter_rules() {
    let ctx = TestContext::new();
    let task = TaskFixture::new().priority(TaskPriority::Low).build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    add_rule(
        &ctx,
        &WorkflowRule::new("only high", TriggerType::Manual)
            .with_condition(Condition::equals("priority", json!("high")))
            .with_action(RuleAction::update_field("touched", json!(true))),
    )
    .await;
    add_rule(
        &ctx,
        &WorkflowRule {
            enabled: false,
            ..WorkflowRule::new("disabled", TriggerType::Manual)
                .with_action(RuleAction::update_field("touched", json!(true)))
        },
    )
    .await;

    let summary = ctx
        .automation
        .execute_workflow(TriggerType::Manual, &task_payload(&task), None)
        .await;

    assert_eq!(summary.rules_evaluated, 1);
    assert_eq!(summary.rules_matched, 0);
    assert_eq!(ctx.store.write_count(), 0);
}

#[tokio::test]
async fn test_failing_action_does_not_stop_later_actions_or_rules() {
    let ctx = TestContext::new();
    let task = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    add_rule(
        &ctx,
        &WorkflowRule::new("mixed", TriggerType::Manual)
            .with_action(RuleAction::new("change_status", json!({ "status": "archived" })))
            .with_action(RuleAction::new("teleport", json!({})))
            .with_action(RuleAction::run_automation("nightly", json!({})))
            .with_action(RuleAction::update_field("after_failure", json!(1)))
            .with_priority(5),
    )
    .await;
    add_rule(
        &ctx,
        &WorkflowRule::new("next", TriggerType::Manual)
            .with_action(RuleAction::change_status(TaskStatus::Review)),
    )
    .await;

    let summary = ctx
        .automation
        .execute_workflow(TriggerType::Manual, &task_payload(&task), None)
        .await;

    assert_eq!(summary.actions_failed, 1);
    assert_eq!(summary.actions_skipped, 2);
    assert_eq!(summary.actions_applied, 2);

    let stored = ctx
        .store
        .get(collections::TASKS, task.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["after_failure"], 1);
    assert_eq!(stored["status"], "review");
}

#[tokio::test]
async fn test_assign_task_is_idempotent() {
    let ctx = TestContext::new();
    let member = Uuid::new_v4();
    let task = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    add_rule(
        &ctx,
        &WorkflowRule::new("assign", TriggerType::Manual)
            .with_action(RuleAction::assign_task(&member.to_string())),
    )
    .await;

    let payload = task_payload(&task);
    let first = ctx.automation.execute_workflow(TriggerType::Manual, &payload, None).await;
    let second = ctx.automation.execute_workflow(TriggerType::Manual, &payload, None).await;

    assert_eq!(first.actions_applied, 1);
    assert_eq!(second.actions_skipped, 1);
    assert_eq!(ctx.task(task.id).await.assigned_to, vec![member]);
}

#[tokio::test]
async fn test_escalate_action_assigns_and_notifies_manager() {
    let ctx = TestContext::new();
    let manager = Uuid::new_v4();
    let worker = Uuid::new_v4();
    let task = TaskFixture::new().assigned(&[worker]).build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    add_rule(
        &ctx,
        &WorkflowRule::new("escalate", TriggerType::Manual)
            .with_action(RuleAction::escalate(&manager.to_string())),
    )
    .await;

    ctx.automation
        .execute_workflow(TriggerType::Manual, &task_payload(&task), None)
        .await;

    assert_eq!(ctx.task(task.id).await.assigned_to, vec![worker, manager]);
    let escalations = ctx.notifications_of(NotificationKind::Escalation).await;
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].user_id, manager);
}

#[tokio::test]
async fn test_update_field_cannot_overwrite_id() {
    let ctx = TestContext::new();
    let task = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    add_rule(
        &ctx,
        &WorkflowRule::new("rename", TriggerType::Manual)
            .with_action(RuleAction::update_field("id", json!(Uuid::new_v4().to_string()))),
    )
    .await;

    let summary = ctx
        .automation
        .execute_workflow(TriggerType::Manual, &task_payload(&task), None)
        .await;

    assert_eq!(summary.actions_failed, 1);
    assert!(ctx.repo().task(task.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_presets_install_once() {
    let ctx = TestContext::new();

    assert_eq!(ctx.automation.install_presets().await, 4);
    assert_eq!(ctx.automation.install_presets().await, 0);
    assert_eq!(ctx.count(collections::WORKFLOW_RULES).await, 4);
}

#[tokio::test]
async fn test_incomplete_review_is_bounced() {
    let ctx = TestContext::new();
    ctx.automation.install_presets().await;

    let worker = Uuid::new_v4();
    let previous = TaskFixture::new()
        .status(TaskStatus::InProgress)
        .progress(60)
        .assigned(&[worker])
        .build();
    ctx.seed_tasks(std::slice::from_ref(&previous)).await;

    let mut current = previous.clone();
    current.status = TaskStatus::Review;

    let summary = ctx.automation.on_task_updated(&previous, &current, None).await;

    assert!(summary.rules_matched >= 1);
    assert_eq!(ctx.task(previous.id).await.status, TaskStatus::InProgress);

    let notices = ctx.notifications_of(NotificationKind::Workflow).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].user_id, worker);
    assert!(notices[0].message.contains("60%"));
    assert!(ctx.automation.engine().presets().iter().any(|p| p.id == REVIEW_BOUNCE_ID));
}

#[tokio::test]
async fn test_completion_notifies_assignees() {
    let ctx = TestContext::new();
    ctx.automation.install_presets().await;

    let team = [Uuid::new_v4(), Uuid::new_v4()];
    let previous = TaskFixture::new().assigned(&team).build();
    ctx.seed_tasks(std::slice::from_ref(&previous)).await;

    let mut current = previous.clone();
    current.status = TaskStatus::Done;
    current.progress = 100;

    ctx.automation.on_task_updated(&previous, &current, None).await;

    let notified: Vec<Uuid> = ctx
        .notifications_of(NotificationKind::Workflow)
        .await
        .iter()
        .map(|n| n.user_id)
        .collect();
    assert_eq!(notified, team.to_vec());
}

#[tokio::test]
async fn test_blocked_since_follows_blocked_by() {
    let ctx = TestContext::new();
    let previous = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&previous)).await;

    let mut blocked = previous.clone();
    blocked.blocked_by = vec![Uuid::new_v4()];
    ctx.automation.on_task_updated(&previous, &blocked, None).await;
    let stored = ctx.task(previous.id).await;
    assert!(stored.blocked_since.is_some());

    let mut unblocked = stored.clone();
    unblocked.blocked_by.clear();
    ctx.automation.on_task_updated(&stored, &unblocked, None).await;
    assert!(ctx.task(previous.id).await.blocked_since.is_none());
}

#[tokio::test]
async fn test_new_block_replaces_stale_blocked_since() {
    let ctx = TestContext::new();
    let mut previous = TaskFixture::new().build();
    // Unblocked outside the hook, so the old timestamp was never cleared.
    previous.blocked_since = Some(Utc::now() - Duration::hours(100));
    ctx.seed_tasks(std::slice::from_ref(&previous)).await;

    let mut blocked = previous.clone();
    blocked.blocked_by = vec![Uuid::new_v4()];
    let before = Utc::now();
    ctx.automation.on_task_updated(&previous, &blocked, None).await;

    let since = ctx
        .task(previous.id)
        .await
        .blocked_since
        .expect("blocked_since recorded");
    assert!(since >= before);
}

#[tokio::test]
async fn test_actions_within_a_rule_run_in_declared_order() {
    let ctx = TestContext::new();
    let task = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    add_rule(
        &ctx,
        &WorkflowRule::new("two-step", TriggerType::Manual)
            .with_action(RuleAction::update_field("stage", json!("first")))
            .with_action(RuleAction::update_field("stage", json!("second"))),
    )
    .await;

    let summary = ctx
        .automation
        .execute_workflow(TriggerType::Manual, &task_payload(&task), None)
        .await;
    assert_eq!(summary.actions_applied, 2);

    let stored = ctx
        .store
        .get(collections::TASKS, task.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["stage"], "second");
}

#[tokio::test]
async fn test_notify_fans_out_through_notifier() {
    let store = Arc::new(MemoryStore::new());
    let repo = Repository::new(store.clone());
    let recipients = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

    let rule = WorkflowRule::new("announce", TriggerType::TaskCreated).with_action(RuleAction::notify(
        json!("{{assigned_to}}"),
        "New task",
        "{{title}}",
    ));
    store
        .seed(collections::WORKFLOW_RULES, vec![serde_json::to_value(&rule).unwrap()])
        .await
        .unwrap();

    let failing = recipients[1];
    let mut notifier = MockNotifier::new();
    notifier
        .expect_create_notification()
        .times(3)
        .returning(move |n| {
            if n.user_id == failing {
                NotificationOutcome::failed("mailbox full")
            } else {
                NotificationOutcome::ok()
            }
        });

    let engine = WorkflowEngine::new(repo, Arc::new(notifier), Arc::from(Vec::new()));
    let task = TaskFixture::new().assigned(&recipients).build();

    let summary = engine.on_task_created(&task, None).await;
    assert_eq!(summary.actions_applied, 1);
    assert_eq!(summary.actions_failed, 0);
}
