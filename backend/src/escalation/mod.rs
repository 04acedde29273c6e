// Escalation Manager - scans open tasks against threshold rules
//
// Every (task, rule) pair escalates at most once per cooldown window. The
// escalation audit record is the dedup key and is written before any action
// runs, so a partially applied escalation is not retried until the window
// passes.

pub mod rules;

pub use rules::{
    default_rules, evaluate_rule, EscalateTo, EscalationAction, EscalationCondition, EscalationRule,
};

use chrono::{DateTime, Duration, Utc};
use crewboard_shared::{roles, Escalation, NotificationKind, Task, TaskPriority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::notifications::{NewNotification, Notifier};
use crate::store::Repository;
use crate::workload::{AssignmentRequirements, WorkloadBalancer};

pub const ESCALATED_TAG: &str = "escalated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSettings {
    pub cooldown_hours: i64,
    /// Schedule percentage after which `low_progress` can fire
    pub elapsed_cutoff_percent: f64,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            cooldown_hours: 24,
            elapsed_cutoff_percent: 70.0,
        }
    }
}

impl EscalationSettings {
    /// `None` unless the cooldown is a positive, representable span.
    pub fn cooldown(&self) -> Option<Duration> {
        Duration::try_hours(self.cooldown_hours).filter(|d| *d > Duration::zero())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EscalationScanReport {
    pub tasks_checked: usize,
    pub escalations_created: usize,
    pub skipped_cooldown: usize,
    pub notifications_sent: usize,
    pub errors: Vec<String>,
}

pub struct EscalationManager {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    balancer: Arc<WorkloadBalancer>,
    rules: Arc<[EscalationRule]>,
    settings: EscalationSettings,
}

impl EscalationManager {
    pub fn new(
        repo: Repository,
        notifier: Arc<dyn Notifier>,
        balancer: Arc<WorkloadBalancer>,
        rules: Arc<[EscalationRule]>,
        settings: EscalationSettings,
    ) -> Self {
        Self {
            repo,
            notifier,
            balancer,
            rules,
            settings,
        }
    }

    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    pub async fn check_escalations(&self) -> EscalationScanReport {
        self.check_escalations_at(Utc::now()).await
    }

    pub async fn check_escalations_at(&self, now: DateTime<Utc>) -> EscalationScanReport {
        let mut report = EscalationScanReport::default();

        let tasks = match self.repo.open_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to load open tasks for escalation scan");
                report.errors.push(format!("Failed to load open tasks: {}", e));
                return report;
            }
        };
        report.tasks_checked = tasks.len();

        let Some(cooldown) = self.settings.cooldown() else {
            error!(cooldown_hours = self.settings.cooldown_hours, "Invalid escalation cooldown");
            report.errors.push(format!(
                "Invalid escalation cooldown of {} hours",
                self.settings.cooldown_hours
            ));
            return report;
        };

        for task in &tasks {
            for rule in self.rules.iter().filter(|r| r.enabled) {
                let Some(reason) =
                    evaluate_rule(rule, task, now, self.settings.elapsed_cutoff_percent)
                else {
                    continue;
                };

                let escalation = Escalation {
                    id: Uuid::new_v4(),
                    task_id: task.id,
                    rule_id: rule.id.clone(),
                    escalated_to: rule.escalate_to.role().to_string(),
                    reason: reason.clone(),
                    created_at: now,
                };

                match self
                    .repo
                    .store()
                    .insert_escalation_if_absent(&escalation, cooldown)
                    .await
                {
                    Ok(true) => {
                        report.escalations_created += 1;
                        info!(task_id = %task.id, rule = %rule.id, reason = %reason, "Task escalated");
                        self.apply_actions(rule, task, &reason, &mut report).await;
                    }
                    Ok(false) => {
                        debug!(task_id = %task.id, rule = %rule.id, "Escalation within cooldown, skipping");
                        report.skipped_cooldown += 1;
                    }
                    Err(e) => {
                        error!(task_id = %task.id, rule = %rule.id, error = %e, "Failed to record escalation");
                        report.errors.push(format!(
                            "Failed to record escalation {} for task {}: {}",
                            rule.id, task.id, e
                        ));
                    }
                }
            }
        }

        info!(
            "Escalation scan complete: {} checked, {} escalated, {} in cooldown, {} errors",
            report.tasks_checked,
            report.escalations_created,
            report.skipped_cooldown,
            report.errors.len()
        );

        report
    }

    /// Runs each action independently; earlier successes are not rolled back.
    async fn apply_actions(
        &self,
        rule: &EscalationRule,
        task: &Task,
        reason: &str,
        report: &mut EscalationScanReport,
    ) {
        for action in &rule.actions {
            let result = match action {
                EscalationAction::Notify => self.notify(rule, task, reason).await.map(|sent| {
                    report.notifications_sent += sent;
                }),
                EscalationAction::ChangePriority => self
                    .repo
                    .set_task_field(task.id, "priority", Value::from(TaskPriority::High.as_str()))
                    .await,
                EscalationAction::Flag => self.flag(task.id).await,
                EscalationAction::Reassign => self.reassign(rule, task).await,
            };

            if let Err(e) = result {
                warn!(task_id = %task.id, rule = %rule.id, action = action.as_str(), error = %e, "Escalation action failed");
                report.errors.push(format!(
                    "Failed to {} task {} for {}: {}",
                    action.as_str(),
                    task.id,
                    rule.id,
                    e
                ));
            }
        }
    }

    /// Admins, then managers for manager rules, then assignees; each user once.
    async fn notify(&self, rule: &EscalationRule, task: &Task, reason: &str) -> StoreResult<usize> {
        let mut staff: Vec<Uuid> = self
            .repo
            .profiles(Some(roles::ADMIN))
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        match rule.escalate_to {
            EscalateTo::Admin => {}
            EscalateTo::Manager => staff.extend(
                self.repo
                    .profiles(Some(roles::MANAGER))
                    .await?
                    .into_iter()
                    .map(|p| p.id),
            ),
            // Tasks carry no client link, so no client profile is told.
            EscalateTo::Client => {
                debug!(task_id = %task.id, rule = %rule.id, "Client escalation notifies admins and assignees only");
            }
        }

        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for id in staff {
            if seen.insert(id) {
                recipients.push((
                    id,
                    format!("Task escalated: {}", task.title),
                    format!("{} ({})", reason, rule.name),
                ));
            }
        }
        for id in &task.assigned_to {
            if seen.insert(*id) {
                recipients.push((
                    *id,
                    format!("Your task needs attention: {}", task.title),
                    reason.to_string(),
                ));
            }
        }

        let link = format!("/tasks/{}", task.id);
        let mut sent = 0;

        for (user_id, title, message) in recipients {
            let outcome = self
                .notifier
                .create_notification(
                    NewNotification::new(user_id, NotificationKind::Escalation, title, message)
                        .with_link(Some(link.clone())),
                )
                .await;

            if outcome.success {
                sent += 1;
            } else {
                warn!(
                    user_id = %user_id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Escalation notification failed"
                );
            }
        }

        Ok(sent)
    }

    async fn flag(&self, task_id: Uuid) -> StoreResult<()> {
        // Re-read so tags changed by earlier actions are kept.
        let task = self.repo.require_task(task_id).await?;
        if task.tags.iter().any(|t| t == ESCALATED_TAG) {
            return Ok(());
        }

        let mut tags = task.tags;
        tags.push(ESCALATED_TAG.to_string());
        self.repo
            .set_task_field(task_id, "tags", serde_json::to_value(tags)?)
            .await
    }

    async fn reassign(&self, rule: &EscalationRule, task: &Task) -> StoreResult<()> {
        let requirements = AssignmentRequirements::with_role(rule.escalate_to.role());

        match self.balancer.find_best_assignee(&requirements).await? {
            Some(member) => {
                self.repo.set_assignees(task.id, &[member.id()]).await?;
                info!(task_id = %task.id, member = %member.profile.full_name, "Escalated task reassigned");
            }
            None => info!(
                task_id = %task.id,
                role = rule.escalate_to.role(),
                "No candidate to reassign escalated task to"
            ),
        }

        Ok(())
    }
}
