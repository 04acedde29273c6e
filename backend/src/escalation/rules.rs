// Escalation rules and their per-task evaluation

use chrono::{DateTime, Utc};
use crewboard_shared::{roles, Task, TaskPriority};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCondition {
    Overdue,
    HighPriorityDelayed,
    BlockedTooLong,
    LowProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalateTo {
    Admin,
    Manager,
    Client,
}

impl EscalateTo {
    /// Profile role that receives the escalation.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Admin => roles::ADMIN,
            Self::Manager => roles::MANAGER,
            Self::Client => roles::CLIENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    Notify,
    Reassign,
    ChangePriority,
    Flag,
}

impl EscalationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Reassign => "reassign",
            Self::ChangePriority => "change_priority",
            Self::Flag => "flag",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EscalationRule {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub condition: EscalationCondition,
    /// Hours, or a progress percentage for `low_progress`
    #[validate(range(min = 0.0))]
    pub threshold: f64,
    pub escalate_to: EscalateTo,
    pub actions: Vec<EscalationAction>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub fn default_rules() -> Vec<EscalationRule> {
    vec![
        EscalationRule {
            id: "overdue-48h".to_string(),
            name: "Overdue for 48 hours".to_string(),
            condition: EscalationCondition::Overdue,
            threshold: 48.0,
            escalate_to: EscalateTo::Admin,
            actions: vec![EscalationAction::Notify, EscalationAction::Flag],
            enabled: true,
        },
        EscalationRule {
            id: "high-priority-delayed-24h".to_string(),
            name: "High priority delayed 24 hours".to_string(),
            condition: EscalationCondition::HighPriorityDelayed,
            threshold: 24.0,
            escalate_to: EscalateTo::Admin,
            actions: vec![
                EscalationAction::Notify,
                EscalationAction::ChangePriority,
                EscalationAction::Flag,
            ],
            enabled: true,
        },
        EscalationRule {
            id: "blocked-72h".to_string(),
            name: "Blocked for 72 hours".to_string(),
            condition: EscalationCondition::BlockedTooLong,
            threshold: 72.0,
            escalate_to: EscalateTo::Manager,
            actions: vec![EscalationAction::Notify],
            enabled: true,
        },
        EscalationRule {
            id: "low-progress-30".to_string(),
            name: "Low progress late in schedule".to_string(),
            condition: EscalationCondition::LowProgress,
            threshold: 30.0,
            escalate_to: EscalateTo::Manager,
            actions: vec![EscalationAction::Notify, EscalationAction::Flag],
            enabled: true,
        },
    ]
}

fn hours_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_seconds() as f64 / 3600.0
}

/// Returns the escalation reason when `task` violates `rule` at `now`.
/// `elapsed_cutoff` is the schedule percentage after which low progress counts.
pub fn evaluate_rule(
    rule: &EscalationRule,
    task: &Task,
    now: DateTime<Utc>,
    elapsed_cutoff: f64,
) -> Option<String> {
    if !task.status.is_open() {
        return None;
    }

    match rule.condition {
        EscalationCondition::Overdue => {
            let overdue = hours_since(task.due_date?, now);
            (overdue > rule.threshold).then(|| format!("Task is {:.0} hours overdue", overdue))
        }
        EscalationCondition::HighPriorityDelayed => {
            if task.priority != TaskPriority::High {
                return None;
            }
            let overdue = hours_since(task.due_date?, now);
            (overdue > rule.threshold)
                .then(|| format!("High-priority task is {:.0} hours overdue", overdue))
        }
        EscalationCondition::BlockedTooLong => {
            if !task.is_blocked() {
                return None;
            }
            match task.blocked_since {
                Some(since) => {
                    let blocked = hours_since(since, now);
                    (blocked > rule.threshold)
                        .then(|| format!("Task has been blocked for {:.0} hours", blocked))
                }
                None => Some(format!(
                    "Task is blocked by {} other task(s)",
                    task.blocked_by.len()
                )),
            }
        }
        EscalationCondition::LowProgress => {
            let start = task.start_date?;
            let due = task.due_date?;
            let span = (due - start).num_seconds();
            if span <= 0 {
                return None;
            }

            let elapsed = (now - start).num_seconds() as f64 / span as f64 * 100.0;
            let progress = task.progress as f64;

            (elapsed > elapsed_cutoff && progress < rule.threshold).then(|| {
                format!(
                    "Task is {:.0}% through its schedule at {}% progress",
                    elapsed, task.progress
                )
            })
        }
    }
}
