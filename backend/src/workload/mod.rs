//! Workload scoring, auto-assignment and team rebalancing.
//!
//! A member's workload is the sum over their open tasks of
//! `priority_weight * remaining_fraction`, where high = 3, medium = 2, low = 1.
//! Scores are recomputed from the store on every call.

use crewboard_shared::{NotificationKind, Profile, Task, TaskPriority};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::notifications::{NewNotification, Notifier};
use crate::store::Repository;

pub fn priority_weight(priority: TaskPriority) -> f64 {
    match priority {
        TaskPriority::High => 3.0,
        TaskPriority::Medium => 2.0,
        TaskPriority::Low => 1.0,
    }
}

/// Contribution of one open task to its assignees' workload.
pub fn task_weight(task: &Task) -> f64 {
    let remaining = (100 - task.progress.clamp(0, 100)) as f64 / 100.0;
    priority_weight(task.priority) * remaining
}

pub fn workload_of(tasks: &[Task]) -> f64 {
    tasks
        .iter()
        .filter(|t| t.status.is_open())
        .map(task_weight)
        .sum()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentRequirements {
    pub role: Option<String>,
    /// Accepted for callers; not used in scoring.
    #[serde(default)]
    pub skills: Vec<String>,
}

impl AssignmentRequirements {
    pub fn with_role(role: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            skills: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(flatten)]
    pub profile: Profile,
    pub current_workload: f64,
}

impl TeamMember {
    pub fn id(&self) -> Uuid {
        self.profile.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReallocationSuggestion {
    pub task_id: Uuid,
    pub task_title: String,
    pub from_member: Uuid,
    pub to_member: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReallocationPlan {
    pub overloaded: Vec<TeamMember>,
    pub underutilized: Vec<TeamMember>,
    pub suggestions: Vec<ReallocationSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Members above `overload_factor * average` are overloaded
    pub overload_factor: f64,
    /// Members below `underuse_factor * average` are underutilized
    pub underuse_factor: f64,
    /// Backlog tasks proposed per overloaded member
    pub max_moves_per_member: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            overload_factor: 1.5,
            underuse_factor: 0.5,
            max_moves_per_member: 3,
        }
    }
}

/// Split members into (overloaded, underutilized) around the team average.
pub fn classify(members: &[TeamMember], config: &BalancerConfig) -> (Vec<TeamMember>, Vec<TeamMember>) {
    if members.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let average = members.iter().map(|m| m.current_workload).sum::<f64>() / members.len() as f64;

    let overloaded = members
        .iter()
        .filter(|m| m.current_workload > config.overload_factor * average)
        .cloned()
        .collect();
    let underutilized = members
        .iter()
        .filter(|m| m.current_workload < config.underuse_factor * average)
        .cloned()
        .collect();

    (overloaded, underutilized)
}

/// Greedy move planning. Each move goes to the underutilized member with the
/// lowest running estimate, and estimates shift by the moved task's weight.
pub fn plan_moves(
    overloaded: &[TeamMember],
    underutilized: &[TeamMember],
    backlog: &HashMap<Uuid, Vec<Task>>,
    config: &BalancerConfig,
) -> Vec<ReallocationSuggestion> {
    let mut estimates: HashMap<Uuid, f64> = overloaded
        .iter()
        .chain(underutilized.iter())
        .map(|m| (m.id(), m.current_workload))
        .collect();
    let names: HashMap<Uuid, &str> = overloaded
        .iter()
        .chain(underutilized.iter())
        .map(|m| (m.id(), m.profile.full_name.as_str()))
        .collect();

    let mut sources: Vec<&TeamMember> = overloaded.iter().collect();
    sources.sort_by(|a, b| {
        b.current_workload
            .total_cmp(&a.current_workload)
            .then(a.id().cmp(&b.id()))
    });

    let mut suggestions = Vec::new();

    for source in sources {
        let Some(tasks) = backlog.get(&source.id()) else {
            continue;
        };

        for task in tasks.iter().take(config.max_moves_per_member) {
            let target = underutilized
                .iter()
                .filter(|m| m.id() != source.id() && !task.is_assigned_to(m.id()))
                .min_by(|a, b| {
                    let ea = estimates.get(&a.id()).copied().unwrap_or(a.current_workload);
                    let eb = estimates.get(&b.id()).copied().unwrap_or(b.current_workload);
                    ea.total_cmp(&eb).then(a.id().cmp(&b.id()))
                });

            let Some(target) = target else {
                continue;
            };

            let source_score = estimates.get(&source.id()).copied().unwrap_or_default();
            let target_score = estimates.get(&target.id()).copied().unwrap_or_default();
            let weight = task_weight(task);

            suggestions.push(ReallocationSuggestion {
                task_id: task.id,
                task_title: task.title.clone(),
                from_member: source.id(),
                to_member: target.id(),
                reason: format!(
                    "{} is overloaded (workload {:.2}); {} has capacity (workload {:.2})",
                    names.get(&source.id()).copied().unwrap_or("member"),
                    source_score,
                    names.get(&target.id()).copied().unwrap_or("member"),
                    target_score,
                ),
            });

            *estimates.entry(source.id()).or_default() -= weight;
            *estimates.entry(target.id()).or_default() += weight;
        }
    }

    suggestions
}

pub struct WorkloadBalancer {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    config: BalancerConfig,
}

impl WorkloadBalancer {
    pub fn new(repo: Repository, notifier: Arc<dyn Notifier>, config: BalancerConfig) -> Self {
        Self {
            repo,
            notifier,
            config,
        }
    }

    pub async fn calculate_workload(&self, member_id: Uuid) -> StoreResult<f64> {
        let tasks = self.repo.open_tasks_for(member_id).await?;
        Ok(workload_of(&tasks))
    }

    /// Profiles (optionally of one role) with their current workload.
    /// Members whose workload cannot be computed are left out.
    pub async fn team_workloads(&self, role: Option<&str>) -> StoreResult<Vec<TeamMember>> {
        let profiles = self.repo.profiles(role).await?;

        let workloads = join_all(profiles.iter().map(|p| self.calculate_workload(p.id))).await;

        let members = profiles
            .into_iter()
            .zip(workloads)
            .filter_map(|(profile, workload)| match workload {
                Ok(current_workload) => Some(TeamMember {
                    profile,
                    current_workload,
                }),
                Err(e) => {
                    warn!(member_id = %profile.id, error = %e, "Skipping member, workload unavailable");
                    None
                }
            })
            .collect();

        Ok(members)
    }

    /// Least-loaded eligible member; ties go to the lower id.
    pub async fn find_best_assignee(
        &self,
        requirements: &AssignmentRequirements,
    ) -> StoreResult<Option<TeamMember>> {
        let members = self.team_workloads(requirements.role.as_deref()).await?;

        Ok(members.into_iter().min_by(|a, b| {
            a.current_workload
                .total_cmp(&b.current_workload)
                .then(a.id().cmp(&b.id()))
        }))
    }

    /// Make the best candidate the task's only assignee and tell them.
    /// Returns `false` when there is no candidate or any step fails.
    pub async fn auto_assign_task(&self, task_id: Uuid, requirements: &AssignmentRequirements) -> bool {
        let member = match self.find_best_assignee(requirements).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                info!(task_id = %task_id, "No candidate available for auto-assignment");
                return false;
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to find assignee");
                return false;
            }
        };

        let task = match self.repo.require_task(task_id).await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to load task for auto-assignment");
                return false;
            }
        };

        if let Err(e) = self.repo.set_assignees(task_id, &[member.id()]).await {
            error!(task_id = %task_id, error = %e, "Failed to assign task");
            return false;
        }

        let outcome = self
            .notifier
            .create_notification(
                NewNotification::new(
                    member.id(),
                    NotificationKind::Assignment,
                    "New task assigned",
                    format!("You have been assigned \"{}\"", task.title),
                )
                .with_link(Some(format!("/tasks/{}", task_id))),
            )
            .await;

        if !outcome.success {
            warn!(
                task_id = %task_id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Assignment notification failed"
            );
            return false;
        }

        info!(
            task_id = %task_id,
            member = %member.profile.full_name,
            workload = member.current_workload,
            "Task auto-assigned"
        );
        true
    }

    pub async fn suggest_task_reallocation(&self) -> StoreResult<ReallocationPlan> {
        let members = self.team_workloads(None).await?;
        let (overloaded, underutilized) = classify(&members, &self.config);

        if overloaded.is_empty() || underutilized.is_empty() {
            return Ok(ReallocationPlan {
                overloaded,
                underutilized,
                suggestions: Vec::new(),
            });
        }

        let mut backlog = HashMap::new();
        for member in &overloaded {
            match self
                .repo
                .backlog_tasks_for(member.id(), self.config.max_moves_per_member)
                .await
            {
                Ok(tasks) => {
                    backlog.insert(member.id(), tasks);
                }
                Err(e) => warn!(member_id = %member.id(), error = %e, "Failed to load backlog"),
            }
        }

        let suggestions = plan_moves(&overloaded, &underutilized, &backlog, &self.config);

        Ok(ReallocationPlan {
            overloaded,
            underutilized,
            suggestions,
        })
    }

    /// Apply every suggestion without review. Returns the number of tasks moved.
    pub async fn balance_team_workload(&self) -> usize {
        let plan = match self.suggest_task_reallocation().await {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "Failed to plan reallocation");
                return 0;
            }
        };

        let mut moved = 0;
        for suggestion in &plan.suggestions {
            match self.apply(suggestion).await {
                Ok(()) => moved += 1,
                Err(e) => error!(task_id = %suggestion.task_id, error = %e, "Failed to move task"),
            }
        }

        info!("Workload balancing moved {} of {} tasks", moved, plan.suggestions.len());
        moved
    }

    async fn apply(&self, suggestion: &ReallocationSuggestion) -> StoreResult<()> {
        let task = self.repo.require_task(suggestion.task_id).await?;

        let mut assignees: Vec<Uuid> = task
            .assigned_to
            .into_iter()
            .filter(|id| *id != suggestion.from_member)
            .collect();
        if !assignees.contains(&suggestion.to_member) {
            assignees.push(suggestion.to_member);
        }

        self.repo.set_assignees(suggestion.task_id, &assignees).await?;

        let outcome = self
            .notifier
            .create_notification(
                NewNotification::new(
                    suggestion.to_member,
                    NotificationKind::Reallocation,
                    "Task reassigned to you",
                    format!("\"{}\" was moved to you. {}", suggestion.task_title, suggestion.reason),
                )
                .with_link(Some(format!("/tasks/{}", suggestion.task_id))),
            )
            .await;

        if !outcome.success {
            warn!(
                task_id = %suggestion.task_id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Reallocation notification failed"
            );
        }

        Ok(())
    }
}
