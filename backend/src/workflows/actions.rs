// Workflow Actions - side effects dispatched when a rule matches
//
// Rules store actions as `{ "type": ..., "params": {...} }`. Before dispatch
// each one is parsed into the closed `ActionKind` enum; a type this build does
// not know becomes `ActionKind::Unknown` and is skipped.

use crewboard_shared::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ActionError, ActionResult};

/// An action as stored on a workflow rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Parsed, typed action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    AssignTask {
        task_id: Uuid,
        assignee: Uuid,
    },
    ChangeStatus {
        task_id: Uuid,
        status: TaskStatus,
    },
    Notify {
        user_ids: Vec<Uuid>,
        title: String,
        message: String,
        link: Option<String>,
    },
    Escalate {
        task_id: Uuid,
        manager_id: Uuid,
    },
    UpdateField {
        task_id: Uuid,
        field: String,
        value: Value,
    },
    RunAutomation {
        automation_id: String,
        data: Value,
    },
    Unknown(String),
}

/// What a dispatched action did
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Applied,
    Skipped(String),
}

impl RuleAction {
    pub fn new(action_type: &str, params: Value) -> Self {
        Self {
            action_type: action_type.to_string(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    pub fn assign_task(assignee: &str) -> Self {
        Self::new("assign_task", serde_json::json!({ "assignee": assignee }))
    }

    pub fn change_status(status: TaskStatus) -> Self {
        Self::new("change_status", serde_json::json!({ "status": status.as_str() }))
    }

    /// `user_id` may be a single id, an array of ids, or a `{{path}}` template.
    pub fn notify(user_id: Value, title: &str, message: &str) -> Self {
        Self::new(
            "notify",
            serde_json::json!({
                "user_id": user_id,
                "title": title,
                "message": message
            }),
        )
    }

    pub fn escalate(manager_id: &str) -> Self {
        Self::new("escalate", serde_json::json!({ "manager_id": manager_id }))
    }

    pub fn update_field(field: &str, value: Value) -> Self {
        Self::new("update_field", serde_json::json!({ "field": field, "value": value }))
    }

    pub fn run_automation(automation_id: &str, data: Value) -> Self {
        Self::new(
            "run_automation",
            serde_json::json!({ "automation_id": automation_id, "data": data }),
        )
    }
}

impl ActionKind {
    /// Parse a stored action. `event` supplies the default task id; `actor`
    /// is the default notification target.
    pub fn parse(action: &RuleAction, event: &Value, actor: Option<Uuid>) -> ActionResult<Self> {
        let params = &action.params;

        let kind = match action.action_type.as_str() {
            "assign_task" => Self::AssignTask {
                task_id: task_id(params, event)?,
                assignee: required_uuid(params, &["assignee", "user_id"], "assignee")?,
            },
            "change_status" => {
                let raw = required_str(params, "status")?;
                let status = TaskStatus::parse(raw)
                    .ok_or_else(|| ActionError::invalid("status", format!("unknown status '{}'", raw)))?;
                Self::ChangeStatus {
                    task_id: task_id(params, event)?,
                    status,
                }
            }
            "notify" => Self::Notify {
                user_ids: recipients(params, actor)?,
                title: required_str(params, "title")?.to_string(),
                message: required_str(params, "message")?.to_string(),
                link: params.get("link").and_then(Value::as_str).map(str::to_string),
            },
            "escalate" => Self::Escalate {
                task_id: task_id(params, event)?,
                manager_id: required_uuid(params, &["manager_id"], "manager_id")?,
            },
            "update_field" => Self::UpdateField {
                task_id: task_id(params, event)?,
                field: required_str(params, "field")?.to_string(),
                value: params.get("value").cloned().unwrap_or(Value::Null),
            },
            "run_automation" => Self::RunAutomation {
                automation_id: required_str(params, "automation_id")?.to_string(),
                data: params.get("data").cloned().unwrap_or(Value::Null),
            },
            other => Self::Unknown(other.to_string()),
        };

        Ok(kind)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AssignTask { .. } => "assign_task",
            Self::ChangeStatus { .. } => "change_status",
            Self::Notify { .. } => "notify",
            Self::Escalate { .. } => "escalate",
            Self::UpdateField { .. } => "update_field",
            Self::RunAutomation { .. } => "run_automation",
            Self::Unknown(name) => name,
        }
    }
}

fn parse_uuid(value: &Value, param: &'static str) -> ActionResult<Uuid> {
    let raw = value
        .as_str()
        .ok_or_else(|| ActionError::invalid(param, format!("expected a string id, got {}", value)))?;
    Uuid::parse_str(raw).map_err(|e| ActionError::invalid(param, e.to_string()))
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &'static str) -> ActionResult<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or(ActionError::MissingParam(key))
}

fn required_uuid(
    params: &Map<String, Value>,
    keys: &[&str],
    param: &'static str,
) -> ActionResult<Uuid> {
    let value = keys
        .iter()
        .find_map(|k| params.get(*k))
        .ok_or(ActionError::MissingParam(param))?;
    parse_uuid(value, param)
}

/// `params.task_id`, then `event.task_id`, then `event.id`.
fn task_id(params: &Map<String, Value>, event: &Value) -> ActionResult<Uuid> {
    let value = params
        .get("task_id")
        .or_else(|| event.get("task_id"))
        .or_else(|| event.get("id"))
        .ok_or(ActionError::MissingParam("task_id"))?;
    parse_uuid(value, "task_id")
}

fn recipients(params: &Map<String, Value>, actor: Option<Uuid>) -> ActionResult<Vec<Uuid>> {
    let value = params.get("user_id").or_else(|| params.get("user_ids"));

    match value {
        Some(Value::Array(items)) => items.iter().map(|v| parse_uuid(v, "user_id")).collect(),
        Some(Value::Null) | None => actor
            .map(|id| vec![id])
            .ok_or(ActionError::MissingParam("user_id")),
        Some(single) => Ok(vec![parse_uuid(single, "user_id")?]),
    }
}
