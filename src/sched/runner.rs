//! Execution runner — runs one attempt of a task under a duration-derived
//! timeout and reports the outcome to the recovery coordinator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::recovery::RecoveryCoordinator;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, TaskEvent};
use crate::task::model::Task;
use crate::task::store::TaskStore;

/// Performs the actual work of a task. The surrounding product supplies
/// the implementation; the engine only cares about the result payload.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(&self, task: &Task, worker_id: &str) -> std::result::Result<serde_json::Value, String>;
}

/// One attempt: `dispatched → running → {succeeded | failed | timed_out}`.
/// Timeouts funnel through the same failure path as any other error.
pub struct ExecutionRunner {
    config: SchedulerConfig,
    store: Arc<TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    recovery: Arc<RecoveryCoordinator>,
    events: EventBus,
}

impl ExecutionRunner {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<TaskStore>,
        executor: Arc<dyn TaskExecutor>,
        recovery: Arc<RecoveryCoordinator>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            recovery,
            events,
        }
    }

    /// Execute one attempt of a task.
    ///
    /// A missing task is a coordination bug and is propagated, not retried —
    /// unless it was simply cancelled, which upstream at-least-once delivery
    /// makes indistinguishable here; callers log and move on either way.
    /// An already-started or terminal task (duplicate delivery) is a
    /// harmless no-op.
    pub async fn execute(&self, task_id: Uuid, worker_id: &str, dispatch_id: &str) -> Result<()> {
        let task = match self.store.mark_started(task_id).await {
            Ok(task) => task,
            Err(e @ Error::TaskNotFound(_)) => return Err(e),
            Err(e) => {
                debug!(task_id = %task_id, dispatch_id, error = %e, "Skipping duplicate delivery");
                return Ok(());
            }
        };

        info!(task_id = %task_id, worker_id, dispatch_id, "Task execution started");
        self.events.emit(TaskEvent::TaskStarted {
            task_id,
            worker_id: worker_id.to_string(),
        });

        let timeout = Duration::from_millis(
            task.estimated_duration_ms * u64::from(self.config.execution_timeout_factor),
        );
        let started = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.executor.run(&task, worker_id)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                self.recovery.on_completion(task_id, result, elapsed_ms).await;
            }
            Ok(Err(error)) => {
                self.recovery.on_failure(task_id, &error).await;
            }
            Err(_) => {
                let error = Error::Timeout {
                    id: task_id,
                    timeout,
                };
                self.recovery.on_failure(task_id, &error.to_string()).await;
            }
        }

        Ok(())
    }
}
