//! Recovery coordinator — turns execution outcomes into retry-or-give-up
//! decisions and releases worker resources on terminal states.
//!
//! Nothing here propagates execution failures to callers: retryable
//! failures surface only as `task_retry` events, permanent failures as
//! terminal status plus `task_failed`.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::workload;
use crate::config::SchedulerConfig;
use crate::directory::{WorkerDirectory, WorkerStatus};
use crate::error::{Error, Result};
use crate::events::{EventBus, TaskEvent};
use crate::metrics::MetricRegistry;
use crate::task::model::{Task, TaskStatus};
use crate::task::store::TaskStore;
use crate::transport::QueueTransport;

pub struct RecoveryCoordinator {
    config: SchedulerConfig,
    store: Arc<TaskStore>,
    directory: Arc<dyn WorkerDirectory>,
    transport: Option<Arc<dyn QueueTransport>>,
    metrics: MetricRegistry,
    events: EventBus,
}

impl RecoveryCoordinator {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<TaskStore>,
        directory: Arc<dyn WorkerDirectory>,
        transport: Option<Arc<dyn QueueTransport>>,
        metrics: MetricRegistry,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            directory,
            transport,
            metrics,
            events,
        }
    }

    /// Handle a successful execution: record the result, release the
    /// worker, archive, and announce.
    pub async fn on_completion(
        &self,
        task_id: Uuid,
        result: serde_json::Value,
        actual_duration_ms: u64,
    ) {
        let task = match self
            .store
            .complete_task(task_id, result, actual_duration_ms)
            .await
        {
            Ok(task) => task,
            Err(e) => {
                // Duplicate delivery or a task cancelled mid-flight.
                debug!(task_id = %task_id, error = %e, "Completion report ignored");
                return;
            }
        };

        let worker_id = task.assigned_to.clone().unwrap_or_default();
        self.release_worker(&task, Some(true)).await;

        info!(
            task_id = %task_id,
            worker_id = %worker_id,
            actual_duration_ms,
            "Task completed"
        );
        self.events.emit(TaskEvent::TaskCompleted {
            task_id,
            worker_id,
            actual_duration_ms,
        });
    }

    /// Handle an execution failure (including timeouts). Retries while the
    /// budget allows; otherwise fails the task permanently. Idempotent with
    /// respect to terminal state: late failure reports for an already-failed
    /// task change nothing.
    pub async fn on_failure(&self, task_id: Uuid, error: &str) {
        let task = match self.store.record_failure(task_id, error).await {
            Ok(task) => task,
            Err(e) => {
                debug!(task_id = %task_id, error = %e, "Failure report ignored");
                return;
            }
        };

        if task.status == TaskStatus::Failed {
            self.release_worker(&task, Some(false)).await;

            warn!(
                task_id = %task_id,
                retry_count = task.retry_count,
                error,
                "Task failed permanently"
            );
            self.events.emit(TaskEvent::TaskFailed {
                task_id,
                error: error.to_string(),
            });
        } else {
            info!(
                task_id = %task_id,
                retry_count = task.retry_count,
                error,
                "Task failed, will retry"
            );
            self.events.emit(TaskEvent::TaskRetry {
                task_id,
                retry_count: task.retry_count,
                error: error.to_string(),
            });
        }
    }

    /// Cancel an active task. Removal from the durable transport is
    /// advisory; the local store is authoritative.
    pub async fn cancel(&self, task_id: Uuid) -> Result<()> {
        let task = self
            .store
            .get_task(task_id)
            .await
            .ok_or(Error::TaskNotFound(task_id))?;

        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(Error::InvalidState {
                id: task_id,
                status: task.status,
                operation: "cancel",
            });
        }

        self.remove_from_transport(task_id).await;
        if !task.status.is_terminal() {
            self.release_worker(&task, None).await;
        }
        self.store.remove_task(task_id).await;

        info!(task_id = %task_id, "Task cancelled");
        self.events.emit(TaskEvent::TaskCancelled { task_id });
        Ok(())
    }

    /// Delete a task unconditionally, regardless of terminal state.
    pub async fn delete(&self, task_id: Uuid) -> Result<()> {
        let task = self
            .store
            .get_task(task_id)
            .await
            .ok_or(Error::TaskNotFound(task_id))?;

        if !task.status.is_terminal() {
            self.remove_from_transport(task_id).await;
            self.release_worker(&task, None).await;
        }
        self.store.remove_task(task_id).await;

        info!(task_id = %task_id, "Task deleted");
        self.events.emit(TaskEvent::TaskDeleted { task_id });
        Ok(())
    }

    /// Release the resources charged to a task's worker at assignment:
    /// load decremented by the recorded delta, status back to available,
    /// project unassigned, and (for execution outcomes) the role-specific
    /// performance metric recorded. Directory errors are logged, never
    /// propagated.
    pub(crate) async fn release_worker(&self, task: &Task, success: Option<bool>) {
        let Some(worker_id) = task.assigned_to.as_deref() else {
            return;
        };
        let cost = task.workload_cost.unwrap_or(0);

        let worker = match self.directory.get_by_id(worker_id).await {
            Ok(Some(worker)) => worker,
            Ok(None) => {
                warn!(worker_id, task_id = %task.id, "Worker vanished before release");
                return;
            }
            Err(e) => {
                warn!(worker_id, error = %e, "Worker lookup failed during release");
                return;
            }
        };

        let new_load = workload::release_load(worker.current_load, cost);
        if let Err(e) = self.directory.update_load(worker_id, new_load).await {
            warn!(worker_id, error = %e, "Load release failed");
        }
        if let Err(e) = self
            .directory
            .update_status(worker_id, WorkerStatus::Available)
            .await
        {
            warn!(worker_id, error = %e, "Status release failed");
        }
        if let Err(e) = self.directory.remove_project(worker_id, task.id).await {
            warn!(worker_id, error = %e, "Project unassign failed");
        }

        if let Some(success) = success {
            let strategy = self.metrics.lookup(&worker.role);
            let update = if success {
                (strategy.on_success)(task)
            } else {
                (strategy.on_failure)(task)
            };
            if let Some((name, value)) = update {
                if let Err(e) = self.directory.record_metric(worker_id, name, value).await {
                    warn!(worker_id, metric = name, error = %e, "Metric record failed");
                }
            }
        }
    }

    /// Best-effort, time-bounded removal of a task's job from the broker.
    pub(crate) async fn remove_from_transport(&self, task_id: Uuid) {
        let Some(transport) = &self.transport else {
            return;
        };

        match tokio::time::timeout(self.config.transport_op_timeout, transport.remove(task_id))
            .await
        {
            Ok(Ok(removed)) => {
                debug!(task_id = %task_id, removed, "Transport job removal attempted")
            }
            Ok(Err(e)) => warn!(task_id = %task_id, error = %e, "Transport job removal failed"),
            Err(_) => warn!(task_id = %task_id, "Transport job removal timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::result::Result;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::directory::{TeamRequest, Worker};
    use crate::error::DirectoryError;
    use crate::persist::NoopSink;
    use crate::task::model::{TaskPriority, TaskSpec};

    #[derive(Default)]
    struct TestDirectory {
        workers: Mutex<HashMap<String, Worker>>,
        metric_calls: Mutex<Vec<(String, String, f64)>>,
    }

    impl TestDirectory {
        fn with_worker(worker: Worker) -> Arc<Self> {
            let dir = Self::default();
            dir.workers.lock().unwrap().insert(worker.id.clone(), worker);
            Arc::new(dir)
        }

        fn worker(&self, id: &str) -> Worker {
            self.workers.lock().unwrap().get(id).unwrap().clone()
        }

        fn metrics(&self) -> Vec<(String, String, f64)> {
            self.metric_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkerDirectory for TestDirectory {
        async fn get_by_id(&self, id: &str) -> Result<Option<Worker>, DirectoryError> {
            Ok(self.workers.lock().unwrap().get(id).cloned())
        }

        async fn find_best_match(
            &self,
            _skills: &[String],
            _priority: TaskPriority,
        ) -> Result<Option<Worker>, DirectoryError> {
            Ok(None)
        }

        async fn find_team(&self, _request: &TeamRequest) -> Result<Vec<Worker>, DirectoryError> {
            Ok(Vec::new())
        }

        async fn update_status(
            &self,
            id: &str,
            status: WorkerStatus,
        ) -> Result<(), DirectoryError> {
            if let Some(w) = self.workers.lock().unwrap().get_mut(id) {
                w.status = status;
            }
            Ok(())
        }

        async fn update_load(&self, id: &str, new_load: u8) -> Result<(), DirectoryError> {
            if let Some(w) = self.workers.lock().unwrap().get_mut(id) {
                w.current_load = new_load;
            }
            Ok(())
        }

        async fn assign_project(&self, _id: &str, _task_id: Uuid) -> Result<(), DirectoryError> {
            Ok(())
        }

        async fn remove_project(&self, _id: &str, _task_id: Uuid) -> Result<(), DirectoryError> {
            Ok(())
        }

        async fn record_metric(
            &self,
            id: &str,
            name: &str,
            value: f64,
        ) -> Result<(), DirectoryError> {
            self.metric_calls
                .lock()
                .unwrap()
                .push((id.to_string(), name.to_string(), value));
            Ok(())
        }

        async fn list_by_skill(&self, _skill: &str) -> Result<Vec<Worker>, DirectoryError> {
            Ok(Vec::new())
        }

        async fn list_all(&self) -> Result<Vec<Worker>, DirectoryError> {
            Ok(self.workers.lock().unwrap().values().cloned().collect())
        }
    }

    fn worker(id: &str, load: u8) -> Worker {
        Worker {
            id: id.into(),
            name: "Sam".into(),
            role: "developer".into(),
            skills: vec!["x".into()],
            status: WorkerStatus::Busy,
            current_load: load,
            department: None,
        }
    }

    struct Fixture {
        store: Arc<TaskStore>,
        directory: Arc<TestDirectory>,
        recovery: RecoveryCoordinator,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        let config = SchedulerConfig::default();
        let events = EventBus::new(config.event_channel_capacity);
        let store = TaskStore::new(config, Arc::new(NoopSink), events.clone());
        let directory = TestDirectory::with_worker(worker("w1", 70));
        let recovery = RecoveryCoordinator::new(
            SchedulerConfig::default(),
            Arc::clone(&store),
            directory.clone(),
            None,
            MetricRegistry::with_defaults(),
            events.clone(),
        );
        Fixture {
            store,
            directory,
            recovery,
            events,
        }
    }

    async fn in_progress_task(store: &TaskStore, max_retries: u32) -> Task {
        let spec = TaskSpec::new("T", "D", 3_600_000)
            .with_priority(TaskPriority::High)
            .with_max_retries(max_retries);
        let task = store.create_task(spec).await.unwrap();
        store.try_assign(task.id, "w1", 20).await.unwrap();
        store.mark_started(task.id).await.unwrap()
    }

    #[tokio::test]
    async fn completion_releases_worker_and_records_metric() {
        let fx = fixture();
        let task = in_progress_task(&fx.store, 3).await;

        fx.recovery
            .on_completion(task.id, serde_json::json!("done"), 500)
            .await;

        let task = fx.store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        let w = fx.directory.worker("w1");
        assert_eq!(w.current_load, 50);
        assert_eq!(w.status, WorkerStatus::Available);
        assert_eq!(
            fx.directory.metrics(),
            vec![("w1".to_string(), "features_completed".to_string(), 1.0)]
        );
    }

    #[tokio::test]
    async fn retryable_failure_keeps_worker_load() {
        let fx = fixture();
        let mut rx = fx.events.subscribe();
        let task = in_progress_task(&fx.store, 3).await;

        fx.recovery.on_failure(task.id, "flaky").await;

        let task = fx.store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        // Load stays charged until a terminal transition (source semantics).
        assert_eq!(fx.directory.worker("w1").current_load, 70);

        let retry = loop {
            match rx.recv().await.unwrap() {
                TaskEvent::TaskRetry {
                    task_id,
                    retry_count,
                    error,
                } => break (task_id, retry_count, error),
                _ => continue,
            }
        };
        assert_eq!(retry, (task.id, 1, "flaky".to_string()));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_permanently() {
        let fx = fixture();
        let task = in_progress_task(&fx.store, 0).await;

        fx.recovery.on_failure(task.id, "boom").await;

        let task = fx.store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));

        let w = fx.directory.worker("w1");
        assert_eq!(w.current_load, 50);
        assert_eq!(
            fx.directory.metrics(),
            vec![("w1".to_string(), "bug_rate".to_string(), 0.05)]
        );

        let history = fx.store.history(0).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn late_failure_reports_are_idempotent() {
        let fx = fixture();
        let task = in_progress_task(&fx.store, 0).await;

        fx.recovery.on_failure(task.id, "boom").await;
        let load_after_release = fx.directory.worker("w1").current_load;

        // A second report must not release resources again.
        fx.recovery.on_failure(task.id, "boom repeat").await;
        assert_eq!(fx.directory.worker("w1").current_load, load_after_release);
        assert_eq!(fx.directory.metrics().len(), 1);
    }

    #[tokio::test]
    async fn cancel_releases_and_removes() {
        let fx = fixture();
        let mut rx = fx.events.subscribe();
        let task = in_progress_task(&fx.store, 3).await;

        fx.recovery.cancel(task.id).await.unwrap();

        assert!(fx.store.get_task(task.id).await.is_none());
        assert_eq!(fx.directory.worker("w1").current_load, 50);

        let saw_cancelled = loop {
            match rx.recv().await.unwrap() {
                TaskEvent::TaskCancelled { task_id } => break task_id == task.id,
                _ => continue,
            }
        };
        assert!(saw_cancelled);
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_states() {
        let fx = fixture();
        let task = in_progress_task(&fx.store, 3).await;
        fx.recovery
            .on_completion(task.id, serde_json::Value::Null, 1)
            .await;

        let err = fx.recovery.cancel(task.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn delete_works_regardless_of_state() {
        let fx = fixture();
        let task = in_progress_task(&fx.store, 3).await;
        fx.recovery
            .on_completion(task.id, serde_json::Value::Null, 1)
            .await;

        fx.recovery.delete(task.id).await.unwrap();
        assert!(fx.store.get_task(task.id).await.is_none());

        // Resources were already released at completion; the load must not
        // be decremented a second time.
        assert_eq!(fx.directory.worker("w1").current_load, 50);
    }

    #[tokio::test]
    async fn delete_unknown_task_is_not_found() {
        let fx = fixture();
        let err = fx.recovery.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(_)));
    }
}
