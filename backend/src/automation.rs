//! Public entry points of the automation core.
//!
//! `Automation` wires the workflow engine, escalation manager, workload
//! balancer and deadline monitor over one shared record store. Scans and
//! workflow runs never fail outward; they return reports instead.

use crewboard_shared::Task;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AutomationConfig;
use crate::error::StoreResult;
use crate::escalation::{EscalationManager, EscalationScanReport};
use crate::jobs::{DeadlineMonitor, DeadlineScanReport};
use crate::notifications::{NotificationService, Notifier};
use crate::store::{RecordStore, Repository};
use crate::workflows::{TriggerType, WorkflowEngine, WorkflowRunSummary};
use crate::workload::{AssignmentRequirements, ReallocationPlan, TeamMember, WorkloadBalancer};

pub struct Automation {
    repo: Repository,
    engine: Arc<WorkflowEngine>,
    escalations: EscalationManager,
    balancer: Arc<WorkloadBalancer>,
    deadlines: DeadlineMonitor,
}

impl Automation {
    /// Notifications are written to the same store.
    pub fn new(store: Arc<dyn RecordStore>, config: &AutomationConfig) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(NotificationService::new(store.clone()));
        Self::with_notifier(store, notifier, config)
    }

    pub fn with_notifier(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        config: &AutomationConfig,
    ) -> Self {
        let repo = Repository::new(store);

        let engine = Arc::new(WorkflowEngine::new(
            repo.clone(),
            notifier.clone(),
            config.workflow_presets.clone(),
        ));
        let balancer = Arc::new(WorkloadBalancer::new(
            repo.clone(),
            notifier.clone(),
            config.balancer.clone(),
        ));
        let escalations = EscalationManager::new(
            repo.clone(),
            notifier.clone(),
            balancer.clone(),
            config.escalation_rules.clone(),
            config.escalation.clone(),
        );
        let deadlines = DeadlineMonitor::new(
            repo.clone(),
            notifier,
            engine.clone(),
            config.upcoming_deadline_window_hours,
        );

        Self {
            repo,
            engine,
            escalations,
            balancer,
            deadlines,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn escalations(&self) -> &EscalationManager {
        &self.escalations
    }

    pub fn balancer(&self) -> &WorkloadBalancer {
        &self.balancer
    }

    pub fn deadlines(&self) -> &DeadlineMonitor {
        &self.deadlines
    }

    pub async fn install_presets(&self) -> usize {
        self.engine.install_presets().await
    }

    // ===== Scheduled scans =====

    pub async fn check_overdue_tasks(&self) -> DeadlineScanReport {
        self.deadlines.check_overdue_tasks().await
    }

    pub async fn check_upcoming_deadlines(&self) -> DeadlineScanReport {
        self.deadlines.check_upcoming_deadlines().await
    }

    pub async fn check_escalations(&self) -> EscalationScanReport {
        self.escalations.check_escalations().await
    }

    // ===== Manual triggers =====

    pub async fn execute_workflow(
        &self,
        trigger: TriggerType,
        event_data: &Value,
        actor: Option<Uuid>,
    ) -> WorkflowRunSummary {
        self.engine.execute_workflow(trigger, event_data, actor).await
    }

    pub async fn on_task_created(&self, task: &Task, actor: Option<Uuid>) -> WorkflowRunSummary {
        self.engine.on_task_created(task, actor).await
    }

    pub async fn on_task_updated(
        &self,
        previous: &Task,
        current: &Task,
        actor: Option<Uuid>,
    ) -> WorkflowRunSummary {
        self.engine.on_task_updated(previous, current, actor).await
    }

    pub async fn calculate_workload(&self, member_id: Uuid) -> StoreResult<f64> {
        self.balancer.calculate_workload(member_id).await
    }

    pub async fn find_best_assignee(
        &self,
        requirements: &AssignmentRequirements,
    ) -> StoreResult<Option<TeamMember>> {
        self.balancer.find_best_assignee(requirements).await
    }

    pub async fn auto_assign_task(&self, task_id: Uuid, requirements: &AssignmentRequirements) -> bool {
        self.balancer.auto_assign_task(task_id, requirements).await
    }

    pub async fn suggest_task_reallocation(&self) -> StoreResult<ReallocationPlan> {
        self.balancer.suggest_task_reallocation().await
    }

    pub async fn balance_team_workload(&self) -> usize {
        self.balancer.balance_team_workload().await
    }
}
