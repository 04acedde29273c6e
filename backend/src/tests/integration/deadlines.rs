use crewboard_shared::{collections, NotificationKind, TaskPriority, TaskStatus};
use serde_json::json;
use uuid::Uuid;

use crate::jobs::{execute_job, AutomationJob, JobStatus};
use crate::store::RecordStore;
use crate::tests::fixtures::TaskFixture;
use crate::tests::helpers::TestContext;
use crate::workflows::{RuleAction, TriggerType, WorkflowRule};

#[tokio::test]
async fn test_overdue_scan_notifies_and_runs_presets() {
    let ctx = TestContext::new();
    ctx.automation.install_presets().await;

    let worker = Uuid::new_v4();
    let urgent = TaskFixture::new()
        .priority(TaskPriority::High)
        .due_in_hours(-2)
        .assigned(&[worker])
        .build();
    let routine = TaskFixture::new().due_in_hours(-2).assigned(&[worker]).build();
    let finished = TaskFixture::new()
        .status(TaskStatus::Done)
        .due_in_hours(-2)
        .assigned(&[worker])
        .build();
    let future = TaskFixture::new().due_in_hours(48).assigned(&[worker]).build();
    ctx.seed_tasks(&[urgent.clone(), routine.clone(), finished, future]).await;

    let report = ctx.automation.check_overdue_tasks().await;

    assert_eq!(report.tasks_checked, 3);
    assert_eq!(report.tasks_matched, 2);
    assert_eq!(report.notifications_sent, 2);
    assert!(report.errors.is_empty());
    assert_eq!(ctx.notifications_of(NotificationKind::Overdue).await.len(), 2);

    // Only the high-priority task matches the overdue preset.
    let marked = ctx.store.get(collections::TASKS, urgent.id).await.unwrap().unwrap();
    assert_eq!(marked["overdue"], true);
    let unmarked = ctx.store.get(collections::TASKS, routine.id).await.unwrap().unwrap();
    assert!(unmarked.get("overdue").is_none());
}

#[tokio::test]
async fn test_upcoming_deadline_window() {
    let ctx = TestContext::new();
    let worker = Uuid::new_v4();

    let soon = TaskFixture::new().due_in_hours(6).assigned(&[worker]).build();
    let later = TaskFixture::new().due_in_hours(72).assigned(&[worker]).build();
    let past = TaskFixture::new().due_in_hours(-6).assigned(&[worker]).build();
    ctx.seed_tasks(&[soon.clone(), later, past]).await;

    ctx.seed(
        collections::WORKFLOW_RULES,
        &[WorkflowRule::new("remind", TriggerType::DueDateApproaching)
            .with_action(RuleAction::update_field("reminded", json!(true)))],
    )
    .await;

    let report = ctx.automation.check_upcoming_deadlines().await;

    assert_eq!(report.tasks_matched, 1);
    assert_eq!(report.workflow_actions_applied, 1);

    let notices = ctx.notifications_of(NotificationKind::Deadline).await;
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.contains(&soon.title));

    let reminded = ctx.store.get(collections::TASKS, soon.id).await.unwrap().unwrap();
    assert_eq!(reminded["reminded"], true);
}

#[tokio::test]
async fn test_job_run_is_logged() {
    let ctx = TestContext::new();
    ctx.seed_tasks(&[TaskFixture::new().due_in_hours(-1).build()]).await;

    let log = execute_job(&ctx.automation, AutomationJob::OverdueCheck).await;

    assert_eq!(log.job_name, "overdue_check");
    assert_eq!(log.status, JobStatus::Completed);
    assert_eq!(log.items_processed, 1);
    assert!(log.completed_at.is_some());
}
