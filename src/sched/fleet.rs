//! Fleet operations — batch assignment across a team, load redistribution,
//! and assignment recommendations. All of these sit on top of the engine;
//! none of them touch task state directly.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::engine::Scheduler;
use super::workload;
use crate::config::SchedulerConfig;
use crate::directory::{TeamRequest, Worker, WorkerDirectory};
use crate::error::{Error, Result};
use crate::task::model::{TaskPriority, TaskStatus};

/// Outcome of a team assignment: which task went to which worker, and which
/// tasks could not be placed.
#[derive(Debug, Default)]
pub struct TeamAssignmentReport {
    pub assignments: Vec<(Uuid, String)>,
    pub skipped: Vec<Uuid>,
}

/// A task moved off an overloaded worker: `(task, from, to)`.
pub type Reassignment = (Uuid, String, String);

/// Who should take a task, with fallback options and a wait estimate.
#[derive(Debug)]
pub struct Recommendation {
    pub best: Worker,
    pub alternatives: Vec<Worker>,
    pub estimated_wait_ms: u64,
}

pub struct FleetOps {
    config: SchedulerConfig,
    scheduler: Arc<Scheduler>,
    directory: Arc<dyn WorkerDirectory>,
}

impl FleetOps {
    pub fn new(
        config: SchedulerConfig,
        scheduler: Arc<Scheduler>,
        directory: Arc<dyn WorkerDirectory>,
    ) -> Self {
        Self {
            config,
            scheduler,
            directory,
        }
    }

    /// Assign a batch of pending tasks across a team picked by the
    /// directory. Each task goes to the member with the most matching
    /// skills; ties go to the member carrying the least load (counting
    /// assignments made earlier in this batch). Tasks that are missing,
    /// not pending, or fail to assign are reported as skipped, never
    /// failing the batch.
    pub async fn assign_tasks_to_team(
        &self,
        task_ids: &[Uuid],
        request: &TeamRequest,
    ) -> Result<TeamAssignmentReport> {
        let team = self.directory.find_team(request).await?;
        if team.is_empty() {
            return Err(Error::NoCandidate {
                skills: request.skills.clone(),
            });
        }

        let mut loads: HashMap<String, u8> = team
            .iter()
            .map(|w| (w.id.clone(), w.current_load))
            .collect();
        let mut report = TeamAssignmentReport::default();

        for &task_id in task_ids {
            let task = match self.scheduler.store().get_task(task_id).await {
                Some(task) if task.status == TaskStatus::Pending => task,
                Some(task) => {
                    warn!(task_id = %task_id, status = ?task.status, "Skipping non-pending task");
                    report.skipped.push(task_id);
                    continue;
                }
                None => {
                    warn!(task_id = %task_id, "Skipping unknown task");
                    report.skipped.push(task_id);
                    continue;
                }
            };

            let member = team
                .iter()
                .max_by(|a, b| {
                    a.skill_overlap(&task.required_skills)
                        .cmp(&b.skill_overlap(&task.required_skills))
                        .then_with(|| {
                            loads
                                .get(&b.id)
                                .cmp(&loads.get(&a.id))
                        })
                })
                .cloned();
            let Some(member) = member else {
                report.skipped.push(task_id);
                continue;
            };

            match self.scheduler.assign_task(task_id, Some(&member.id)).await {
                Ok(_) => {
                    let delta =
                        workload::workload_delta(task.priority, task.estimated_duration_ms);
                    loads
                        .entry(member.id.clone())
                        .and_modify(|l| *l = workload::apply_load(*l, delta));
                    report.assignments.push((task_id, member.id));
                }
                Err(e) => {
                    warn!(task_id = %task_id, worker_id = %member.id, error = %e, "Team assignment failed");
                    report.skipped.push(task_id);
                }
            }
        }

        info!(
            assigned = report.assignments.len(),
            skipped = report.skipped.len(),
            "Team assignment finished"
        );
        Ok(report)
    }

    /// Move load off overloaded workers. For each worker above the
    /// overload threshold, at most one of their still-assigned (not yet
    /// started) tasks moves to a best-match worker below the underload
    /// threshold. A balanced fleet is a logged no-op.
    pub async fn redistribute_workload(&self) -> Result<Vec<Reassignment>> {
        let workers = self.directory.list_all().await?;
        let overloaded: Vec<&Worker> = workers
            .iter()
            .filter(|w| w.current_load > self.config.overloaded_threshold)
            .collect();

        if overloaded.is_empty() {
            info!("No overloaded workers, nothing to redistribute");
            return Ok(Vec::new());
        }

        let mut moves = Vec::new();
        for worker in overloaded {
            // Assigned-not-started tasks, plus pending tasks still bound to
            // this worker after a retryable failure.
            let candidate_task = self
                .scheduler
                .store()
                .tasks_by_worker(&worker.id)
                .await
                .into_iter()
                .find(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Assigned));
            let Some(task) = candidate_task else {
                continue;
            };

            let target = match self
                .directory
                .find_best_match(&task.required_skills, task.priority)
                .await?
            {
                Some(target)
                    if target.id != worker.id
                        && target.current_load < self.config.underloaded_threshold =>
                {
                    target
                }
                _ => continue,
            };

            self.scheduler.unassign_task(task.id).await?;
            match self.scheduler.assign_task(task.id, Some(&target.id)).await {
                Ok(_) => {
                    info!(
                        task_id = %task.id,
                        from = %worker.id,
                        to = %target.id,
                        "Task redistributed"
                    );
                    moves.push((task.id, worker.id.clone(), target.id));
                }
                Err(e) => {
                    // The task stays pending; the next scheduling pass
                    // picks it up.
                    warn!(task_id = %task.id, error = %e, "Redistribution reassign failed");
                }
            }
        }

        Ok(moves)
    }

    /// Recommend a worker for a skill/priority combination without
    /// assigning anything. The wait estimate is a minute per load point
    /// above half capacity.
    pub async fn recommendations(
        &self,
        required_skills: &[String],
        priority: TaskPriority,
    ) -> Result<Recommendation> {
        let best = self
            .directory
            .find_best_match(required_skills, priority)
            .await?
            .ok_or_else(|| Error::NoCandidate {
                skills: required_skills.to_vec(),
            })?;

        let mut alternatives = match required_skills.first() {
            Some(skill) => self.directory.list_by_skill(skill).await?,
            None => Vec::new(),
        };
        alternatives.retain(|w| w.id != best.id && w.status.is_assignable());
        alternatives.sort_by_key(|w| w.current_load);
        alternatives.truncate(3);

        let estimated_wait_ms = u64::from(best.current_load.saturating_sub(50)) * 60_000;

        Ok(Recommendation {
            best,
            alternatives,
            estimated_wait_ms,
        })
    }
}
