// Workflow Engine - evaluates stored rules for a trigger and dispatches actions

use chrono::Utc;
use crewboard_shared::{collections, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::actions::{ActionOutcome, RuleAction};
use super::conditions::{self, Condition};
use super::executor::{ActionDispatcher, ExecutionContext};
use super::triggers::{TriggerEvent, TriggerType};
use crate::notifications::Notifier;
use crate::store::{Query, Repository, SortDirection};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorkflowRule {
    pub id: Uuid,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: TriggerType,
    /// AND-ed; empty means always match
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher runs first
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowRule {
    pub fn new(name: &str, trigger: TriggerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            trigger,
            conditions: Vec::new(),
            actions: Vec::new(),
            enabled: true,
            priority: 0,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn matches(&self, event_data: &Value) -> bool {
        conditions::matches(&self.conditions, event_data)
    }
}

/// Counters for one `execute_workflow` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunSummary {
    pub rules_evaluated: usize,
    pub rules_matched: usize,
    pub actions_applied: usize,
    pub actions_skipped: usize,
    pub actions_failed: usize,
}

impl WorkflowRunSummary {
    fn absorb(&mut self, other: WorkflowRunSummary) {
        self.rules_evaluated += other.rules_evaluated;
        self.rules_matched += other.rules_matched;
        self.actions_applied += other.actions_applied;
        self.actions_skipped += other.actions_skipped;
        self.actions_failed += other.actions_failed;
    }
}

pub struct WorkflowEngine {
    repo: Repository,
    dispatcher: ActionDispatcher,
    presets: Arc<[WorkflowRule]>,
}

impl WorkflowEngine {
    pub fn new(repo: Repository, notifier: Arc<dyn Notifier>, presets: Arc<[WorkflowRule]>) -> Self {
        let dispatcher = ActionDispatcher::new(repo.clone(), notifier);
        Self {
            repo,
            dispatcher,
            presets,
        }
    }

    pub fn presets(&self) -> &[WorkflowRule] {
        &self.presets
    }

    /// Store every preset whose id is not yet present. Returns how many were added.
    pub async fn install_presets(&self) -> usize {
        let mut installed = 0;

        for preset in self.presets.iter() {
            match self.repo.store().get(collections::WORKFLOW_RULES, preset.id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    error!(rule = %preset.name, error = %e, "Failed to look up preset");
                    continue;
                }
            }

            match self.repo.insert_as(collections::WORKFLOW_RULES, preset).await {
                Ok(()) => installed += 1,
                Err(e) => error!(rule = %preset.name, error = %e, "Failed to install preset"),
            }
        }

        info!("Installed {} workflow presets", installed);
        installed
    }

    /// Enabled rules for a trigger, highest priority first.
    async fn load_rules(&self, trigger: TriggerType) -> Vec<WorkflowRule> {
        let query = Query::new()
            .eq("trigger", trigger.as_str())
            .eq("enabled", true)
            .order_by("priority", SortDirection::Descending);

        match self.repo.list_as::<WorkflowRule>(collections::WORKFLOW_RULES, &query).await {
            Ok(mut rules) => {
                rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
                rules
            }
            Err(e) => {
                error!(trigger = %trigger, error = %e, "Failed to load workflow rules");
                Vec::new()
            }
        }
    }

    /// Run every enabled rule for `trigger` against `event_data`. Never fails:
    /// action errors are logged and counted, and later actions and rules still run.
    pub async fn execute_workflow(
        &self,
        trigger: TriggerType,
        event_data: &Value,
        actor: Option<Uuid>,
    ) -> WorkflowRunSummary {
        let rules = self.load_rules(trigger).await;
        let mut summary = WorkflowRunSummary::default();

        debug!(trigger = %trigger, rules = rules.len(), "Evaluating workflow rules");

        for rule in &rules {
            summary.rules_evaluated += 1;

            if !rule.matches(event_data) {
                continue;
            }

            summary.rules_matched += 1;
            info!(rule = %rule.name, trigger = %trigger, "Workflow rule matched");

            let context = ExecutionContext {
                rule_id: Some(rule.id),
                rule_name: rule.name.clone(),
                event_payload: event_data.clone(),
                actor,
            };

            // Sequential: later actions may depend on earlier mutations.
            for action in &rule.actions {
                match self.dispatcher.dispatch(action, &context).await {
                    Ok(ActionOutcome::Applied) => summary.actions_applied += 1,
                    Ok(ActionOutcome::Skipped(reason)) => {
                        debug!(rule = %rule.name, action = %action.action_type, reason = %reason, "Action skipped");
                        summary.actions_skipped += 1;
                    }
                    Err(e) => {
                        error!(rule = %rule.name, action = %action.action_type, error = %e, "Action failed");
                        summary.actions_failed += 1;
                    }
                }
            }
        }

        summary
    }

    pub async fn process_event(&self, event: &TriggerEvent) -> WorkflowRunSummary {
        self.execute_workflow(event.trigger_type, &event.payload, event.actor)
            .await
    }

    pub async fn on_task_created(&self, task: &Task, actor: Option<Uuid>) -> WorkflowRunSummary {
        self.process_event(&TriggerEvent::for_task(TriggerType::TaskCreated, task, actor))
            .await
    }

    /// Fires `task_updated`, plus `status_changed` and `task_completed` when
    /// they apply. Also keeps `blocked_since` in step with `blocked_by`.
    pub async fn on_task_updated(
        &self,
        previous: &Task,
        current: &Task,
        actor: Option<Uuid>,
    ) -> WorkflowRunSummary {
        let current = self.track_blocked_since(previous, current).await;
        let mut summary = self
            .process_event(&TriggerEvent::for_task(TriggerType::TaskUpdated, &current, actor))
            .await;

        if previous.status != current.status {
            summary.absorb(
                self.process_event(&TriggerEvent::status_changed(&current, previous.status, actor))
                    .await,
            );

            if current.status == TaskStatus::Done {
                summary.absorb(
                    self.process_event(&TriggerEvent::for_task(TriggerType::TaskCompleted, &current, actor))
                        .await,
                );
            }
        }

        summary
    }

    async fn track_blocked_since(&self, previous: &Task, current: &Task) -> Task {
        let mut task = current.clone();

        // A fresh block always restarts the clock, whatever the record carried.
        let blocked_since = if !previous.is_blocked() && current.is_blocked() {
            Some(Value::from(Utc::now().to_rfc3339()))
        } else if !current.is_blocked() && current.blocked_since.is_some() {
            Some(Value::Null)
        } else {
            None
        };

        if let Some(value) = blocked_since {
            task.blocked_since = value.as_str().and_then(|raw| raw.parse().ok());
            if let Err(e) = self.repo.set_task_field(task.id, "blocked_since", value).await {
                warn!(task_id = %task.id, error = %e, "Failed to record blocked_since");
            }
        }

        task
    }
}
