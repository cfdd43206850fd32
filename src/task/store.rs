//! Task store — in-memory authoritative map of active tasks plus the
//! bounded history ring. Owns task identity and status transitions; every
//! mutation happens through the operations here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::{HistoryEntry, TaskHistory};
use super::model::{CommentKind, Task, TaskComment, TaskSpec, TaskStatus, TaskUpdate};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result, ValidationError};
use crate::events::{EventBus, TaskEvent};
use crate::persist::PersistenceSink;

/// In-memory task store with fire-and-forget persistence.
pub struct TaskStore {
    config: SchedulerConfig,
    tasks: RwLock<HashMap<Uuid, Task>>,
    history: RwLock<TaskHistory>,
    sink: Arc<dyn PersistenceSink>,
    events: EventBus,
}

impl TaskStore {
    pub fn new(
        config: SchedulerConfig,
        sink: Arc<dyn PersistenceSink>,
        events: EventBus,
    ) -> Arc<Self> {
        let history = TaskHistory::new(config.history_cap, config.history_trim_target());
        Arc::new(Self {
            config,
            tasks: RwLock::new(HashMap::new()),
            history: RwLock::new(history),
            sink,
            events,
        })
    }

    // ── Creation and updates ────────────────────────────────────────

    /// Validate a spec, assign an id, and store the task as pending.
    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task> {
        spec.validate()?;
        let task = Task::from_spec(spec, self.config.default_max_retries);

        let snapshot = {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task.id, task.clone());
            tasks.values().cloned().collect()
        };

        info!(task_id = %task.id, title = %task.title, priority = %task.priority, "Task created");
        self.events.emit(TaskEvent::TaskCreated { task: task.clone() });
        self.spawn_persist(snapshot);

        Ok(task)
    }

    /// Idempotent upsert for externally-constructed tasks (legacy import).
    pub async fn add_task(&self, task: Task) -> Task {
        let (is_new, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let is_new = !tasks.contains_key(&task.id);
            tasks.insert(task.id, task.clone());
            (is_new, tasks.values().cloned().collect())
        };

        if is_new {
            info!(task_id = %task.id, "Task imported");
            self.events.emit(TaskEvent::TaskCreated { task: task.clone() });
        } else {
            debug!(task_id = %task.id, "Task upserted over existing entry");
        }
        self.spawn_persist(snapshot);

        task
    }

    /// Mutate the allow-listed descriptive fields of a task.
    pub async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task> {
        update.validate()?;

        let (task, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
            update.apply(task);
            (task.clone(), tasks.values().cloned().collect())
        };

        self.events.emit(TaskEvent::TaskStatusUpdated {
            task_id: id,
            status: task.status,
        });
        self.spawn_persist(snapshot);

        Ok(task)
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    pub async fn all_tasks(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub async fn tasks_by_worker(&self, worker_id: &str) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.assigned_to.as_deref() == Some(worker_id))
            .cloned()
            .collect()
    }

    /// Pending tasks whose dependencies have all completed or been resolved.
    /// Tasks with unmet (or unknown) dependencies are never eligible for
    /// automatic selection.
    pub async fn ready_tasks(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependencies.iter().all(|dep| {
                    tasks
                        .get(dep)
                        .is_some_and(|d| {
                            matches!(d.status, TaskStatus::Completed | TaskStatus::Resolved)
                        })
                })
            })
            .cloned()
            .collect()
    }

    /// Most recent history entries, newest first (0 = all).
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.read().await.recent(limit)
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    // ── Lifecycle transitions ───────────────────────────────────────

    /// Atomically bind a pending task to a worker (check-and-set on status).
    /// Serializes concurrent assignment attempts on the same task.
    pub async fn try_assign(&self, id: Uuid, worker_id: &str, workload_cost: u8) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

        if task.status != TaskStatus::Pending {
            return Err(Error::InvalidState {
                id,
                status: task.status,
                operation: "assign",
            });
        }

        task.status = TaskStatus::Assigned;
        task.assigned_to = Some(worker_id.to_string());
        task.assigned_at = Some(Utc::now());
        task.workload_cost = Some(workload_cost);
        Ok(task.clone())
    }

    /// Transition an assigned task to in-progress.
    pub async fn mark_started(&self, id: Uuid) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

        if task.status != TaskStatus::Assigned {
            return Err(Error::InvalidState {
                id,
                status: task.status,
                operation: "start",
            });
        }

        task.status = TaskStatus::InProgress;
        if task.started_at.is_none() {
            task.started_at = Some(Utc::now());
        }
        Ok(task.clone())
    }

    /// Record a successful execution.
    pub async fn complete_task(
        &self,
        id: Uuid,
        result: serde_json::Value,
        actual_duration_ms: u64,
    ) -> Result<Task> {
        let (task, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

            if task.status != TaskStatus::InProgress {
                return Err(Error::InvalidState {
                    id,
                    status: task.status,
                    operation: "complete",
                });
            }

            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.result = Some(result);
            task.actual_duration_ms = Some(actual_duration_ms);
            let task = task.clone();

            self.push_history(&task).await;
            (task, tasks.values().cloned().collect())
        };

        self.spawn_persist(snapshot);
        Ok(task)
    }

    /// Record an execution failure. Increments the retry count, then either
    /// re-pends the task (retry budget remaining) or fails it terminally.
    /// The caller branches on the returned status.
    pub async fn record_failure(&self, id: Uuid, error: &str) -> Result<Task> {
        let (task, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

            if task.status.is_terminal() {
                return Err(Error::InvalidState {
                    id,
                    status: task.status,
                    operation: "fail",
                });
            }

            task.retry_count += 1;
            task.error = Some(error.to_string());

            // A budget of N allows N retries: the (N+1)th failure is terminal.
            if task.retry_count > task.max_retries {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(Utc::now());
                let task = task.clone();
                self.push_history(&task).await;
                (task, tasks.values().cloned().collect())
            } else {
                // Retryable: back to pending. The assigned worker's resources
                // stay accounted until a terminal transition or explicit
                // unassign (source semantics, preserved as observed).
                task.status = TaskStatus::Pending;
                (task.clone(), tasks.values().cloned().collect())
            }
        };

        self.spawn_persist(snapshot);
        Ok(task)
    }

    /// Mark a completed task as resolved, with an optional resolution comment.
    pub async fn resolve_task(&self, id: Uuid, comment: Option<String>) -> Result<Task> {
        let (task, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

            if task.status != TaskStatus::Completed {
                return Err(Error::InvalidState {
                    id,
                    status: task.status,
                    operation: "resolve",
                });
            }

            task.status = TaskStatus::Resolved;
            task.resolved_at = Some(Utc::now());
            if let Some(text) = comment {
                task.comments
                    .push(TaskComment::new(CommentKind::Resolution, text));
            }
            (task.clone(), tasks.values().cloned().collect())
        };

        info!(task_id = %id, "Task resolved");
        self.events.emit(TaskEvent::TaskResolved { task_id: id });
        self.spawn_persist(snapshot);

        Ok(task)
    }

    /// Reopen a completed or resolved task. The reason is mandatory and is
    /// kept on the audit trail; the retry count increments by exactly one.
    pub async fn reopen_task(&self, id: Uuid, reason: &str) -> Result<Task> {
        if reason.trim().is_empty() {
            return Err(ValidationError::ReopenReasonMissing.into());
        }

        let (task, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

            if !matches!(task.status, TaskStatus::Completed | TaskStatus::Resolved) {
                return Err(Error::InvalidState {
                    id,
                    status: task.status,
                    operation: "reopen",
                });
            }

            task.status = TaskStatus::Pending;
            task.reopened_at = Some(Utc::now());
            task.retry_count += 1;
            task.assigned_to = None;
            task.workload_cost = None;
            task.comments
                .push(TaskComment::new(CommentKind::ReopenReason, reason));
            (task.clone(), tasks.values().cloned().collect())
        };

        info!(task_id = %id, reason, "Task reopened");
        self.events.emit(TaskEvent::TaskReopened {
            task_id: id,
            reason: reason.to_string(),
        });
        self.spawn_persist(snapshot);

        Ok(task)
    }

    /// Return a task to pending and unbind its worker (redistribution path).
    pub async fn unbind_worker(&self, id: Uuid) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;

        if task.status.is_terminal() {
            return Err(Error::InvalidState {
                id,
                status: task.status,
                operation: "unassign",
            });
        }

        task.status = TaskStatus::Pending;
        task.assigned_to = None;
        task.workload_cost = None;
        Ok(task.clone())
    }

    /// Remove a task from the active store. The local store is authoritative
    /// for "is this task still active".
    pub async fn remove_task(&self, id: Uuid) -> Option<Task> {
        let (removed, snapshot) = {
            let mut tasks = self.tasks.write().await;
            let removed = tasks.remove(&id);
            (removed, tasks.values().cloned().collect())
        };

        if removed.is_some() {
            self.spawn_persist(snapshot);
        }
        removed
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Append a terminal task to history. Called only by terminal
    /// transitions, atomically with the transition that triggered it.
    async fn push_history(&self, task: &Task) {
        let entry = HistoryEntry::from_task(task, self.config.history_description_max);
        self.history.write().await.push(entry);
    }

    /// Fire-and-forget snapshot write; failures are logged, never fatal.
    fn spawn_persist(&self, tasks: Vec<Task>) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.save_snapshot(tasks).await {
                warn!(error = %e, "Task snapshot write failed");
            }
        });
    }
}
