// Job Scheduler - fixed-interval drivers for the automation scans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::info;
use uuid::Uuid;

use crate::automation::Automation;

const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub overdue_check_interval_minutes: u32,
    pub deadline_check_interval_minutes: u32,
    pub escalation_check_interval_minutes: u32,
    pub workload_balance_interval_hours: u32,
    pub auto_balance_enabled: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            overdue_check_interval_minutes: 60,
            deadline_check_interval_minutes: 60,
            escalation_check_interval_minutes: 30,
            workload_balance_interval_hours: 24,
            // Balancing reassigns tasks without review
            auto_balance_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationJob {
    OverdueCheck,
    DeadlineCheck,
    EscalationCheck,
    WorkloadBalance,
}

impl AutomationJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OverdueCheck => "overdue_check",
            Self::DeadlineCheck => "deadline_check",
            Self::EscalationCheck => "escalation_check",
            Self::WorkloadBalance => "workload_balance",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "overdue_check" => Some(Self::OverdueCheck),
            "deadline_check" => Some(Self::DeadlineCheck),
            "escalation_check" => Some(Self::EscalationCheck),
            "workload_balance" => Some(Self::WorkloadBalance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: usize,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

/// Fixed spacing between runs. Zero is raised to one minute.
pub fn job_interval(minutes: u32) -> std::time::Duration {
    std::time::Duration::from_secs(u64::from(minutes.max(1)) * 60)
}

/// Run one job to completion and describe the run.
pub async fn execute_job(automation: &Automation, job: AutomationJob) -> JobExecutionLog {
    let started_at = Utc::now();
    info!(job = job.name(), "Running automation job");

    let (items_processed, errors) = match job {
        AutomationJob::OverdueCheck => {
            let report = automation.check_overdue_tasks().await;
            info!(
                "Overdue check completed: {} tasks checked, {} overdue",
                report.tasks_checked, report.tasks_matched
            );
            (report.tasks_checked, report.errors)
        }
        AutomationJob::DeadlineCheck => {
            let report = automation.check_upcoming_deadlines().await;
            info!(
                "Deadline check completed: {} tasks checked, {} due soon",
                report.tasks_checked, report.tasks_matched
            );
            (report.tasks_checked, report.errors)
        }
        AutomationJob::EscalationCheck => {
            let report = automation.check_escalations().await;
            (report.tasks_checked, report.errors)
        }
        AutomationJob::WorkloadBalance => (automation.balance_team_workload().await, Vec::new()),
    };

    let completed_at = Utc::now();

    JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: job.name().to_string(),
        started_at,
        completed_at: Some(completed_at),
        status: if errors.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::PartialFailure
        },
        items_processed,
        errors,
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    }
}

async fn record_log(logs: &RwLock<Vec<JobExecutionLog>>, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    automation: Arc<Automation>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(automation: Arc<Automation>, config: JobConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            automation,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting automation job scheduler");

        self.schedule(
            AutomationJob::OverdueCheck,
            self.config.overdue_check_interval_minutes,
        )
        .await?;
        self.schedule(
            AutomationJob::DeadlineCheck,
            self.config.deadline_check_interval_minutes,
        )
        .await?;
        self.schedule(
            AutomationJob::EscalationCheck,
            self.config.escalation_check_interval_minutes,
        )
        .await?;

        if self.config.auto_balance_enabled {
            self.schedule(
                AutomationJob::WorkloadBalance,
                self.config.workload_balance_interval_hours.saturating_mul(60),
            )
            .await?;
        } else {
            info!("Auto-balancing is disabled, skipping workload balance job");
        }

        self.scheduler.start().await?;

        info!("Automation job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down automation job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule(&self, job: AutomationJob, interval_minutes: u32) -> JobResult<()> {
        let automation = self.automation.clone();
        let logs = self.execution_logs.clone();

        let repeated = Job::new_repeated_async(job_interval(interval_minutes), move |_uuid, _lock| {
            let automation = automation.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let log = execute_job(&automation, job).await;
                record_log(&logs, log).await;
            })
        })?;

        self.scheduler.add(repeated).await?;
        info!("Scheduled {} to run every {} minutes", job.name(), interval_minutes);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<JobExecutionLog> {
        let job = AutomationJob::parse(job_name)
            .ok_or_else(|| JobError::UnknownJob(job_name.to_string()))?;

        let log = execute_job(&self.automation, job).await;
        record_log(&self.execution_logs, log.clone()).await;
        Ok(log)
    }
}
