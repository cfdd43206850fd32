//! Assignment engine — binds pending tasks to workers and hands them to the
//! dispatch layer.
//!
//! Dispatch runs in one of two modes: `Durable` enqueues through the broker
//! transport and waits for delivery events; `Fallback` executes in-process.
//! A failed enqueue flips the engine to fallback so the assignment still
//! lands somewhere; the next dispatch (or a broker `Ready` event) probes the
//! transport and flips back once it answers.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::recovery::RecoveryCoordinator;
use super::runner::{ExecutionRunner, TaskExecutor};
use super::workload;
use crate::config::SchedulerConfig;
use crate::directory::{Worker, WorkerDirectory, WorkerStatus};
use crate::error::{Error, Result};
use crate::events::{EventBus, TaskEvent};
use crate::metrics::MetricRegistry;
use crate::task::model::{Task, TaskStatus};
use crate::task::store::TaskStore;
use crate::transport::{DispatchJob, DispatchMode, EnqueueOptions, QueueTransport, TransportEvent};

/// Everything the scheduler needs from the surrounding product.
pub struct SchedulerDeps {
    pub store: Arc<TaskStore>,
    pub directory: Arc<dyn WorkerDirectory>,
    pub transport: Option<Arc<dyn QueueTransport>>,
    pub executor: Arc<dyn TaskExecutor>,
    pub metrics: MetricRegistry,
    pub events: EventBus,
}

pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<TaskStore>,
    directory: Arc<dyn WorkerDirectory>,
    transport: Option<Arc<dyn QueueTransport>>,
    mode: RwLock<DispatchMode>,
    runner: Arc<ExecutionRunner>,
    recovery: Arc<RecoveryCoordinator>,
    events: EventBus,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, deps: SchedulerDeps) -> Arc<Self> {
        let recovery = Arc::new(RecoveryCoordinator::new(
            config.clone(),
            Arc::clone(&deps.store),
            Arc::clone(&deps.directory),
            deps.transport.clone(),
            deps.metrics,
            deps.events.clone(),
        ));
        let runner = Arc::new(ExecutionRunner::new(
            config.clone(),
            Arc::clone(&deps.store),
            deps.executor,
            Arc::clone(&recovery),
            deps.events.clone(),
        ));
        let mode = if deps.transport.is_some() {
            DispatchMode::Durable
        } else {
            DispatchMode::Fallback
        };

        Arc::new(Self {
            config,
            store: deps.store,
            directory: deps.directory,
            transport: deps.transport,
            mode: RwLock::new(mode),
            runner,
            recovery,
            events: deps.events,
        })
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn dispatch_mode(&self) -> DispatchMode {
        *self.mode.read().await
    }

    /// Assign a pending task to a worker.
    ///
    /// With an explicit `worker_id` the worker must exist; without one the
    /// directory picks the best skill match. Either way the worker must be
    /// assignable (not offline). On success the task is `assigned`, the
    /// worker is charged the workload delta and marked busy, and the task is
    /// dispatched for execution.
    pub async fn assign_task(&self, task_id: Uuid, worker_id: Option<&str>) -> Result<Task> {
        let task = self
            .store
            .get_task(task_id)
            .await
            .ok_or(Error::TaskNotFound(task_id))?;
        if task.status != TaskStatus::Pending {
            return Err(Error::InvalidState {
                id: task_id,
                status: task.status,
                operation: "assign",
            });
        }

        let worker = self.resolve_worker(&task, worker_id).await?;
        if !worker.status.is_assignable() {
            return Err(Error::WorkerUnavailable {
                id: worker.id,
                status: worker.status,
            });
        }

        let delta = workload::workload_delta(task.priority, task.estimated_duration_ms);
        let task = self.store.try_assign(task_id, &worker.id, delta).await?;

        // Directory bookkeeping is best-effort once the task is bound; a
        // failing directory call must not strand a task that passed the CAS.
        if let Err(e) = self
            .directory
            .update_status(&worker.id, WorkerStatus::Busy)
            .await
        {
            warn!(worker_id = %worker.id, error = %e, "Worker status update failed");
        }
        if let Err(e) = self
            .directory
            .update_load(&worker.id, workload::apply_load(worker.current_load, delta))
            .await
        {
            warn!(worker_id = %worker.id, error = %e, "Worker load update failed");
        }
        if let Err(e) = self.directory.assign_project(&worker.id, task_id).await {
            warn!(worker_id = %worker.id, error = %e, "Project assignment failed");
        }

        info!(
            task_id = %task_id,
            worker_id = %worker.id,
            workload_delta = delta,
            "Task assigned"
        );
        // Observers must see `assigned` before the runner's `started`.
        self.events.emit(TaskEvent::TaskAssigned {
            task_id,
            worker_id: worker.id.clone(),
        });

        self.dispatch(&task, &worker.id).await;
        Ok(task)
    }

    async fn resolve_worker(&self, task: &Task, worker_id: Option<&str>) -> Result<Worker> {
        match worker_id {
            Some(id) => self
                .directory
                .get_by_id(id)
                .await?
                .ok_or_else(|| Error::WorkerNotFound(id.to_string())),
            None => self
                .directory
                .find_best_match(&task.required_skills, task.priority)
                .await?
                .ok_or_else(|| Error::NoCandidate {
                    skills: task.required_skills.clone(),
                }),
        }
    }

    /// Hand an assigned task to its execution path. Never fails the
    /// assignment: a broken broker degrades to in-process execution.
    async fn dispatch(&self, task: &Task, worker_id: &str) {
        if self.probe_mode().await == DispatchMode::Durable {
            if let Some(transport) = &self.transport {
                let job = DispatchJob {
                    task_id: task.id,
                    worker_id: worker_id.to_string(),
                    job_id: Uuid::new_v4().to_string(),
                };
                let opts = EnqueueOptions {
                    priority: workload::transport_priority(task.priority),
                    delay_ms: 0,
                };
                let enqueue =
                    tokio::time::timeout(self.config.transport_op_timeout, transport.enqueue(&job, opts));
                match enqueue.await {
                    Ok(Ok(job_id)) => {
                        debug!(task_id = %task.id, job_id, "Task enqueued");
                        return;
                    }
                    Ok(Err(e)) => self.degrade(&format!("enqueue failed: {e}")).await,
                    Err(_) => self.degrade("enqueue timed out").await,
                }
            }
        }

        // In-process fallback: execution must not block the caller.
        let runner = Arc::clone(&self.runner);
        let task_id = task.id;
        let worker = worker_id.to_string();
        let dispatch_id = format!("local-{}", Uuid::new_v4());
        tokio::spawn(async move {
            if let Err(e) = runner.execute(task_id, &worker, &dispatch_id).await {
                error!(task_id = %task_id, error = %e, "Fallback execution failed");
            }
        });
        debug!(task_id = %task.id, worker_id, "Task dispatched in-process");
    }

    /// Current mode, re-probing the broker when degraded so one recovered
    /// transport flips the engine back without outside help.
    async fn probe_mode(&self) -> DispatchMode {
        let Some(transport) = &self.transport else {
            return DispatchMode::Fallback;
        };

        let mode = *self.mode.read().await;
        if mode == DispatchMode::Fallback && transport.is_ready().await {
            self.restore_durable().await;
            return DispatchMode::Durable;
        }
        mode
    }

    async fn degrade(&self, reason: &str) {
        let mut mode = self.mode.write().await;
        if *mode != DispatchMode::Fallback {
            warn!(reason, "Durable dispatch degraded to in-process fallback");
            *mode = DispatchMode::Fallback;
        }
        self.events.emit(TaskEvent::QueueError {
            message: reason.to_string(),
        });
    }

    async fn restore_durable(&self) {
        let mut mode = self.mode.write().await;
        if *mode != DispatchMode::Durable {
            info!("Durable transport recovered, resuming durable dispatch");
            *mode = DispatchMode::Durable;
        }
    }

    /// Listen for broker delivery events and drive executions from them.
    /// Returns `None` when the engine has no transport.
    pub fn spawn_transport_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let transport = self.transport.clone()?;
        let mut rx = transport.subscribe();
        let this = Arc::clone(self);

        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(TransportEvent::Active { job }) => {
                        let runner = Arc::clone(&this.runner);
                        tokio::spawn(async move {
                            if let Err(e) =
                                runner.execute(job.task_id, &job.worker_id, &job.job_id).await
                            {
                                error!(task_id = %job.task_id, error = %e, "Delivered execution failed");
                            }
                        });
                    }
                    Ok(TransportEvent::Failed { job, error }) => {
                        this.recovery.on_failure(job.task_id, &error).await;
                    }
                    Ok(TransportEvent::Completed { job, .. }) => {
                        debug!(task_id = %job.task_id, "Broker acknowledged completion");
                    }
                    Ok(TransportEvent::Stalled { job }) => {
                        warn!(task_id = %job.task_id, job_id = %job.job_id, "Broker job stalled");
                    }
                    Ok(TransportEvent::Ready) => {
                        this.restore_durable().await;
                    }
                    Ok(TransportEvent::Waiting { .. }) => {}
                    Ok(TransportEvent::Error { message }) => {
                        warn!(message, "Broker error");
                        this.events.emit(TaskEvent::QueueError { message });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Transport event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Undo an assignment: pull the job from the broker, give the worker its
    /// capacity back, and park the task as pending again.
    pub async fn unassign_task(&self, task_id: Uuid) -> Result<Task> {
        let task = self
            .store
            .get_task(task_id)
            .await
            .ok_or(Error::TaskNotFound(task_id))?;

        self.recovery.remove_from_transport(task_id).await;
        self.recovery.release_worker(&task, None).await;
        let task = self.store.unbind_worker(task_id).await?;

        info!(task_id = %task_id, "Task unassigned");
        self.events.emit(TaskEvent::TaskCancelled { task_id });
        Ok(task)
    }

    /// Reopen a completed or resolved task, optionally assigning it straight
    /// back to a worker.
    pub async fn reopen_task(
        &self,
        task_id: Uuid,
        reason: &str,
        assign_to: Option<&str>,
    ) -> Result<Task> {
        let task = self.store.reopen_task(task_id, reason).await?;
        match assign_to {
            Some(worker_id) => self.assign_task(task_id, Some(worker_id)).await,
            None => Ok(task),
        }
    }

    pub async fn cancel_task(&self, task_id: Uuid) -> Result<()> {
        self.recovery.cancel(task_id).await
    }

    pub async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        self.recovery.delete(task_id).await
    }
}
