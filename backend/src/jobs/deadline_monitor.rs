// Deadline Monitor - overdue and upcoming due-date scans

use chrono::{DateTime, Duration, Utc};
use crewboard_shared::{NotificationKind, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::notifications::{notify_users, Notifier};
use crate::store::Repository;
use crate::workflows::triggers::task_payload;
use crate::workflows::{TriggerType, WorkflowEngine};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DeadlineScanReport {
    pub tasks_checked: usize,
    pub tasks_matched: usize,
    pub notifications_sent: usize,
    pub workflow_actions_applied: usize,
    pub errors: Vec<String>,
}

pub struct DeadlineMonitor {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    engine: Arc<WorkflowEngine>,
    upcoming_window: Duration,
}

impl DeadlineMonitor {
    pub fn new(
        repo: Repository,
        notifier: Arc<dyn Notifier>,
        engine: Arc<WorkflowEngine>,
        upcoming_window_hours: i64,
    ) -> Self {
        let upcoming_window = Duration::try_hours(upcoming_window_hours)
            .filter(|window| *window >= Duration::zero())
            .unwrap_or_else(|| {
                warn!(hours = upcoming_window_hours, "Invalid upcoming deadline window, using 24 hours");
                Duration::hours(24)
            });

        Self {
            repo,
            notifier,
            engine,
            upcoming_window,
        }
    }

    pub async fn check_overdue_tasks(&self) -> DeadlineScanReport {
        self.check_overdue_tasks_at(Utc::now()).await
    }

    /// Open tasks whose due date has passed.
    pub async fn check_overdue_tasks_at(&self, now: DateTime<Utc>) -> DeadlineScanReport {
        self.scan(
            |due| due < now,
            NotificationKind::Overdue,
            TriggerType::TaskOverdue,
            |task| {
                (
                    "Task overdue".to_string(),
                    format!("\"{}\" is past its due date", task.title),
                )
            },
        )
        .await
    }

    pub async fn check_upcoming_deadlines(&self) -> DeadlineScanReport {
        self.check_upcoming_deadlines_at(Utc::now()).await
    }

    /// Open tasks due between `now` and the end of the window, inclusive.
    pub async fn check_upcoming_deadlines_at(&self, now: DateTime<Utc>) -> DeadlineScanReport {
        let horizon = now
            .checked_add_signed(self.upcoming_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.scan(
            |due| due >= now && due <= horizon,
            NotificationKind::Deadline,
            TriggerType::DueDateApproaching,
            |task| {
                let due = task
                    .due_date
                    .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_default();
                (
                    "Deadline approaching".to_string(),
                    format!("\"{}\" is due {}", task.title, due),
                )
            },
        )
        .await
    }

    async fn scan(
        &self,
        due_matches: impl Fn(DateTime<Utc>) -> bool,
        kind: NotificationKind,
        trigger: TriggerType,
        render: impl Fn(&Task) -> (String, String),
    ) -> DeadlineScanReport {
        let mut report = DeadlineScanReport::default();

        let tasks = match self.repo.open_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(trigger = %trigger, error = %e, "Failed to load open tasks");
                report.errors.push(format!("Failed to load open tasks: {}", e));
                return report;
            }
        };
        report.tasks_checked = tasks.len();

        for task in tasks
            .iter()
            .filter(|t| t.due_date.map(&due_matches).unwrap_or(false))
        {
            report.tasks_matched += 1;

            let (title, message) = render(task);
            let link = format!("/tasks/{}", task.id);
            let sent = notify_users(
                self.notifier.as_ref(),
                &task.assigned_to,
                kind,
                &title,
                &message,
                Some(&link),
            )
            .await;
            report.notifications_sent += sent;
            if sent < task.assigned_to.len() {
                report.errors.push(format!(
                    "{} of {} notifications failed for task {}",
                    task.assigned_to.len() - sent,
                    task.assigned_to.len(),
                    task.id
                ));
            }

            let summary = self
                .engine
                .execute_workflow(trigger, &task_payload(task), None)
                .await;
            report.workflow_actions_applied += summary.actions_applied;
            if summary.actions_failed > 0 {
                report.errors.push(format!(
                    "{} workflow actions failed for task {}",
                    summary.actions_failed, task.id
                ));
            }
        }

        info!(
            trigger = %trigger,
            "Deadline scan complete: {} checked, {} matched, {} notifications",
            report.tasks_checked, report.tasks_matched, report.notifications_sent
        );

        report
    }
}
