// Built-in workflow rules installed on first start.
//
// Ids are fixed so `WorkflowEngine::install_presets` stays idempotent.

use crewboard_shared::TaskStatus;
use serde_json::json;
use uuid::Uuid;

use super::actions::RuleAction;
use super::conditions::presets;
use super::engine::WorkflowRule;
use super::triggers::TriggerType;

pub const COMPLETION_NOTICE_ID: Uuid = Uuid::from_u128(0x6f1c_2a4e_0001_4000_8000_0000_0000_0001);
pub const HIGH_PRIORITY_NOTICE_ID: Uuid = Uuid::from_u128(0x6f1c_2a4e_0001_4000_8000_0000_0000_0002);
pub const OVERDUE_HIGH_PRIORITY_ID: Uuid = Uuid::from_u128(0x6f1c_2a4e_0001_4000_8000_0000_0000_0003);
pub const REVIEW_BOUNCE_ID: Uuid = Uuid::from_u128(0x6f1c_2a4e_0001_4000_8000_0000_0000_0004);

pub fn default_presets() -> Vec<WorkflowRule> {
    vec![
        WorkflowRule {
            id: COMPLETION_NOTICE_ID,
            description: Some("Tell everyone on a task when it is finished".to_string()),
            ..WorkflowRule::new("Notify assignees on completion", TriggerType::TaskCompleted)
        }
        .with_action(RuleAction::notify(
            json!("{{assigned_to}}"),
            "Task completed",
            "\"{{title}}\" was marked done",
        )),
        WorkflowRule {
            id: HIGH_PRIORITY_NOTICE_ID,
            ..WorkflowRule::new("Announce high-priority tasks", TriggerType::TaskCreated)
        }
        .with_condition(presets::high_priority())
        .with_action(RuleAction::notify(
            json!("{{assigned_to}}"),
            "High-priority task assigned",
            "\"{{title}}\" needs your attention",
        ))
        .with_priority(10),
        WorkflowRule {
            id: OVERDUE_HIGH_PRIORITY_ID,
            ..WorkflowRule::new("Mark overdue high-priority tasks", TriggerType::TaskOverdue)
        }
        .with_condition(presets::high_priority())
        .with_action(RuleAction::update_field("overdue", json!(true)))
        .with_action(RuleAction::notify(
            json!("{{assigned_to}}"),
            "High-priority task overdue",
            "\"{{title}}\" is past its due date",
        ))
        .with_priority(20),
        WorkflowRule {
            id: REVIEW_BOUNCE_ID,
            description: Some("Reviews need a finished task".to_string()),
            ..WorkflowRule::new("Return incomplete reviews", TriggerType::StatusChanged)
        }
        .with_condition(presets::new_status(TaskStatus::Review.as_str()))
        .with_condition(presets::progress_below(100.0))
        .with_action(RuleAction::change_status(TaskStatus::InProgress))
        .with_action(RuleAction::notify(
            json!("{{assigned_to}}"),
            "Task returned to in progress",
            "\"{{title}}\" went to review at {{progress}}% and was sent back",
        )),
    ]
}
