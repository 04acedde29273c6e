// Workflow Executor - dispatches parsed actions against the record store

use crewboard_shared::NotificationKind;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{ActionKind, ActionOutcome, RuleAction};
use super::conditions::{resolve_path, to_js_string};
use crate::error::{ActionError, ActionResult};
use crate::notifications::{notify_users, NewNotification, Notifier};
use crate::store::Repository;

static TEMPLATE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("valid template pattern"));

/// Context for one rule's action run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub rule_id: Option<Uuid>,
    pub rule_name: String,
    pub event_payload: Value,
    pub actor: Option<Uuid>,
}

impl ExecutionContext {
    pub fn new(rule_name: impl Into<String>, event_payload: Value, actor: Option<Uuid>) -> Self {
        Self {
            rule_id: None,
            rule_name: rule_name.into(),
            event_payload,
            actor,
        }
    }
}

pub struct ActionDispatcher {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
}

impl ActionDispatcher {
    pub fn new(repo: Repository, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    /// Resolve templates, parse and execute one stored action.
    pub async fn dispatch(
        &self,
        action: &RuleAction,
        context: &ExecutionContext,
    ) -> ActionResult<ActionOutcome> {
        let resolved = RuleAction {
            action_type: action.action_type.clone(),
            params: process_templates(&action.params, &context.event_payload),
        };

        let kind = ActionKind::parse(&resolved, &context.event_payload, context.actor)?;
        info!(rule = %context.rule_name, action = kind.name(), "Executing action");
        self.execute(kind).await
    }

    pub async fn execute(&self, kind: ActionKind) -> ActionResult<ActionOutcome> {
        match kind {
            ActionKind::AssignTask { task_id, assignee } => self.assign_task(task_id, assignee).await,
            ActionKind::ChangeStatus { task_id, status } => {
                self.repo
                    .set_task_field(task_id, "status", Value::from(status.as_str()))
                    .await?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::Notify {
                user_ids,
                title,
                message,
                link,
            } => {
                let delivered = notify_users(
                    self.notifier.as_ref(),
                    &user_ids,
                    NotificationKind::Workflow,
                    &title,
                    &message,
                    link.as_deref(),
                )
                .await;
                if delivered < user_ids.len() {
                    warn!(delivered, requested = user_ids.len(), "Some workflow notifications failed");
                }
                Ok(ActionOutcome::Applied)
            }
            ActionKind::Escalate {
                task_id,
                manager_id,
            } => self.escalate(task_id, manager_id).await,
            ActionKind::UpdateField {
                task_id,
                field,
                value,
            } => {
                if field == "id" {
                    return Err(ActionError::invalid("field", "the task id cannot be overwritten"));
                }
                self.repo.set_task_field(task_id, &field, value).await?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::RunAutomation { automation_id, .. } => {
                info!(automation_id = %automation_id, "Custom automations are not available; skipping");
                Ok(ActionOutcome::Skipped(format!(
                    "custom automation '{}' not implemented",
                    automation_id
                )))
            }
            ActionKind::Unknown(name) => {
                warn!(action_type = %name, "Ignoring unknown action type");
                Ok(ActionOutcome::Skipped(format!("unknown action type '{}'", name)))
            }
        }
    }

    /// Add `assignee` to the task's assignees unless already present.
    async fn assign_task(&self, task_id: Uuid, assignee: Uuid) -> ActionResult<ActionOutcome> {
        let task = self
            .repo
            .task(task_id)
            .await?
            .ok_or(ActionError::TaskNotFound(task_id))?;

        if task.is_assigned_to(assignee) {
            return Ok(ActionOutcome::Skipped(format!("{} already assigned", assignee)));
        }

        let mut assignees = task.assigned_to;
        assignees.push(assignee);
        self.repo.set_assignees(task_id, &assignees).await?;

        Ok(ActionOutcome::Applied)
    }

    async fn escalate(&self, task_id: Uuid, manager_id: Uuid) -> ActionResult<ActionOutcome> {
        let task = self
            .repo
            .task(task_id)
            .await?
            .ok_or(ActionError::TaskNotFound(task_id))?;

        self.assign_task(task_id, manager_id).await?;

        let outcome = self
            .notifier
            .create_notification(
                NewNotification::new(
                    manager_id,
                    NotificationKind::Escalation,
                    "Task escalated",
                    format!("Task \"{}\" has been escalated to you", task.title),
                )
                .with_link(Some(format!("/tasks/{}", task_id))),
            )
            .await;

        if !outcome.success {
            warn!(
                task_id = %task_id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Escalation notification failed"
            );
        }

        Ok(ActionOutcome::Applied)
    }
}

/// Replace `{{path}}` templates in string params with values from the event.
pub fn process_templates(params: &Map<String, Value>, payload: &Value) -> Map<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), process_value(v, payload)))
        .collect()
}

fn process_value(value: &Value, payload: &Value) -> Value {
    match value {
        Value::String(s) => replace_template_vars(s, payload),
        Value::Object(map) => Value::Object(process_templates(map, payload)),
        Value::Array(items) => Value::Array(items.iter().map(|v| process_value(v, payload)).collect()),
        other => other.clone(),
    }
}

fn replace_template_vars(template: &str, payload: &Value) -> Value {
    // A string that is exactly one template takes the raw value, so arrays
    // and numbers survive substitution.
    if let Some(cap) = TEMPLATE_VAR.captures(template) {
        if cap.get(0).map(|m| m.as_str() == template).unwrap_or(false) {
            if let Some(found) = resolve_path(payload, &cap[1]) {
                return found.clone();
            }
        }
    }

    let replaced = TEMPLATE_VAR.replace_all(template, |cap: &regex::Captures| {
        match resolve_path(payload, &cap[1]) {
            Some(found) => to_js_string(Some(found)),
            None => cap[0].to_string(),
        }
    });

    Value::String(replaced.into_owned())
}
