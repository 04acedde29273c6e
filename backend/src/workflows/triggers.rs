// Workflow Triggers - task lifecycle events that start rule evaluation

use chrono::{DateTime, Utc};
use crewboard_shared::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TaskCreated,
    TaskUpdated,
    StatusChanged,
    DueDateApproaching,
    TaskOverdue,
    TaskCompleted,
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::StatusChanged => "status_changed",
            Self::DueDateApproaching => "due_date_approaching",
            Self::TaskOverdue => "task_overdue",
            Self::TaskCompleted => "task_completed",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for trigger events
pub type EventPayload = Value;

/// A trigger event that can initiate workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub payload: EventPayload,
    pub actor: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, payload: EventPayload, actor: Option<Uuid>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            payload,
            actor,
            timestamp: Utc::now(),
        }
    }

    pub fn for_task(trigger_type: TriggerType, task: &Task, actor: Option<Uuid>) -> Self {
        Self::new(trigger_type, task_payload(task), actor)
    }

    /// Task payload plus `old_status`/`new_status`.
    pub fn status_changed(task: &Task, old_status: TaskStatus, actor: Option<Uuid>) -> Self {
        let mut payload = task_payload(task);
        if let Value::Object(map) = &mut payload {
            map.insert("old_status".to_string(), Value::from(old_status.as_str()));
            map.insert("new_status".to_string(), Value::from(task.status.as_str()));
        }
        Self::new(TriggerType::StatusChanged, payload, actor)
    }
}

/// Serialize a task as event data; also exposes `task_id` for action defaults.
pub fn task_payload(task: &Task) -> Value {
    let mut payload = serde_json::to_value(task).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut payload {
        map.insert("task_id".to_string(), Value::from(task.id.to_string()));
    }
    payload
}
