use crewboard_shared::{roles, NotificationKind, Profile, TaskPriority, TaskStatus};
use uuid::Uuid;

use crate::tests::fixtures::{ProfileFixture, TaskFixture};
use crate::tests::helpers::TestContext;
use crate::workload::AssignmentRequirements;

#[tokio::test]
async fn test_workload_counts_open_tasks_only() {
    let ctx = TestContext::new();
    let member = Uuid::new_v4();
    let other = Uuid::new_v4();

    ctx.seed_tasks(&[
        TaskFixture::new().priority(TaskPriority::High).assigned(&[member]).build(),
        TaskFixture::new()
            .priority(TaskPriority::Medium)
            .progress(50)
            .assigned(&[member, other])
            .build(),
        TaskFixture::new()
            .priority(TaskPriority::High)
            .status(TaskStatus::Done)
            .assigned(&[member])
            .build(),
        TaskFixture::new().priority(TaskPriority::Low).assigned(&[other]).build(),
    ])
    .await;

    assert_eq!(ctx.automation.calculate_workload(member).await.unwrap(), 4.0);
    assert_eq!(ctx.automation.calculate_workload(other).await.unwrap(), 2.0);
    assert_eq!(ctx.automation.calculate_workload(Uuid::new_v4()).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_best_assignee_respects_role_and_ties() {
    let ctx = TestContext::new();
    let low_id = Uuid::from_u128(1);
    let high_id = Uuid::from_u128(2);
    let profiles = vec![
        ProfileFixture::member().id(high_id).build(),
        ProfileFixture::member().id(low_id).build(),
        ProfileFixture::manager().build(),
    ];
    ctx.seed_profiles(&profiles).await;

    let members = ctx
        .automation
        .find_best_assignee(&AssignmentRequirements::with_role(roles::MEMBER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(members.id(), low_id);

    let manager = ctx
        .automation
        .find_best_assignee(&AssignmentRequirements::with_role(roles::MANAGER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manager.profile.role, roles::MANAGER);

    let nobody = ctx
        .automation
        .find_best_assignee(&AssignmentRequirements::with_role(roles::CLIENT))
        .await
        .unwrap();
    assert!(nobody.is_none());
}

#[tokio::test]
async fn test_auto_assign_overwrites_assignees() {
    let ctx = TestContext::new();
    let busy = ProfileFixture::member().build();
    let free = ProfileFixture::member().build();
    ctx.seed_profiles(&[busy.clone(), free.clone()]).await;

    let load = TaskFixture::new().assigned(&[busy.id]).build();
    let task = TaskFixture::new().assigned(&[busy.id]).build();
    ctx.seed_tasks(&[load, task.clone()]).await;

    let assigned = ctx
        .automation
        .auto_assign_task(task.id, &AssignmentRequirements::default())
        .await;

    // busy carries both tasks (4.0), free carries none
    assert!(assigned);
    assert_eq!(ctx.task(task.id).await.assigned_to, vec![free.id]);

    let notices = ctx.notifications_of(NotificationKind::Assignment).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].user_id, free.id);
    assert!(notices[0].message.contains(&task.title));
}

#[tokio::test]
async fn test_auto_assign_without_candidates_writes_nothing() {
    let ctx = TestContext::new();
    let task = TaskFixture::new().build();
    ctx.seed_tasks(std::slice::from_ref(&task)).await;

    let assigned = ctx
        .automation
        .auto_assign_task(task.id, &AssignmentRequirements::default())
        .await;

    assert!(!assigned);
    assert_eq!(ctx.store.write_count(), 0);
}

#[tokio::test]
async fn test_auto_assign_missing_task_fails() {
    let ctx = TestContext::new();
    ctx.seed_profiles(&[ProfileFixture::member().build()]).await;

    let assigned = ctx
        .automation
        .auto_assign_task(Uuid::new_v4(), &AssignmentRequirements::default())
        .await;

    assert!(!assigned);
    assert_eq!(ctx.store.write_count(), 0);
}

async fn unbalanced_team(ctx: &TestContext) -> (Profile, Profile, Profile) {
    let heavy = ProfileFixture::member().build();
    let light = ProfileFixture::member().build();
    let idle = ProfileFixture::member().build();
    ctx.seed_profiles(&[heavy.clone(), light.clone(), idle.clone()]).await;

    let mut tasks: Vec<_> = (0..4)
        .map(|_| {
            TaskFixture::new()
                .status(TaskStatus::Backlog)
                .priority(TaskPriority::High)
                .assigned(&[heavy.id])
                .build()
        })
        .collect();
    tasks.push(TaskFixture::new().assigned(&[light.id]).build());
    ctx.seed_tasks(&tasks).await;

    (heavy, light, idle)
}

#[tokio::test]
async fn test_reallocation_spreads_across_underutilized() {
    let ctx = TestContext::new();
    let (heavy, light, idle) = unbalanced_team(&ctx).await;

    // workloads 12 / 2 / 0, average 4.67
    let plan = ctx.automation.suggest_task_reallocation().await.unwrap();

    assert_eq!(plan.overloaded.len(), 1);
    assert_eq!(plan.overloaded[0].id(), heavy.id);
    assert_eq!(plan.underutilized.len(), 2);

    let targets: Vec<Uuid> = plan.suggestions.iter().map(|s| s.to_member).collect();
    assert_eq!(targets, vec![idle.id, light.id, idle.id]);
    assert!(plan.suggestions.iter().all(|s| s.from_member == heavy.id));
}

#[tokio::test]
async fn test_balance_applies_every_move() {
    let ctx = TestContext::new();
    let (heavy, _, _) = unbalanced_team(&ctx).await;

    let moved = ctx.automation.balance_team_workload().await;
    assert_eq!(moved, 3);

    assert_eq!(ctx.automation.calculate_workload(heavy.id).await.unwrap(), 3.0);
    assert_eq!(ctx.notifications_of(NotificationKind::Reallocation).await.len(), 3);
}

#[tokio::test]
async fn test_balanced_team_has_no_suggestions() {
    let ctx = TestContext::new();
    let a = ProfileFixture::member().build();
    let b = ProfileFixture::member().build();
    ctx.seed_profiles(&[a.clone(), b.clone()]).await;
    ctx.seed_tasks(&[
        TaskFixture::new().assigned(&[a.id]).build(),
        TaskFixture::new().assigned(&[b.id]).build(),
    ])
    .await;

    let plan = ctx.automation.suggest_task_reallocation().await.unwrap();
    assert!(plan.suggestions.is_empty());
    assert_eq!(ctx.automation.balance_team_workload().await, 0);
}
