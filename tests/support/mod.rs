//! Shared fixtures for integration tests: an in-memory worker directory,
//! a scripted broker transport, and a scripted executor, wired into a
//! scheduler the way the surrounding product would wire the real ones.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use taskgrid::config::SchedulerConfig;
use taskgrid::events::TaskEvent;
use taskgrid::directory::{TeamRequest, Worker, WorkerDirectory, WorkerStatus};
use taskgrid::error::{DirectoryError, TransportError};
use taskgrid::events::EventBus;
use taskgrid::metrics::MetricRegistry;
use taskgrid::persist::NoopSink;
use taskgrid::sched::{Scheduler, SchedulerDeps, TaskExecutor};
use taskgrid::task::model::{Task, TaskPriority, TaskStatus};
use taskgrid::task::store::TaskStore;
use taskgrid::transport::{
    DispatchJob, EnqueueOptions, JobState, QueueTransport, TransportEvent,
};

pub fn worker(id: &str, role: &str, skills: &[&str], load: u8) -> Worker {
    Worker {
        id: id.into(),
        name: format!("worker {id}"),
        role: role.into(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        status: WorkerStatus::Available,
        current_load: load,
        department: None,
    }
}

/// In-memory directory; best match is the least-loaded assignable worker
/// covering every required skill.
#[derive(Default)]
pub struct StubDirectory {
    pub workers: Mutex<HashMap<String, Worker>>,
    pub metric_calls: Mutex<Vec<(String, String, f64)>>,
}

impl StubDirectory {
    pub fn with_workers(workers: impl IntoIterator<Item = Worker>) -> Arc<Self> {
        let dir = Self::default();
        {
            let mut map = dir.workers.lock().unwrap();
            for w in workers {
                map.insert(w.id.clone(), w);
            }
        }
        Arc::new(dir)
    }

    pub fn worker(&self, id: &str) -> Worker {
        self.workers.lock().unwrap().get(id).unwrap().clone()
    }

    pub fn metrics(&self) -> Vec<(String, String, f64)> {
        self.metric_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerDirectory for StubDirectory {
    async fn get_by_id(&self, id: &str) -> Result<Option<Worker>, DirectoryError> {
        Ok(self.workers.lock().unwrap().get(id).cloned())
    }

    async fn find_best_match(
        &self,
        skills: &[String],
        _priority: TaskPriority,
    ) -> Result<Option<Worker>, DirectoryError> {
        let workers = self.workers.lock().unwrap();
        let mut candidates: Vec<&Worker> = workers
            .values()
            .filter(|w| w.status.is_assignable())
            .filter(|w| skills.iter().all(|s| w.skills.contains(s)))
            .collect();
        candidates.sort_by_key(|w| w.current_load);
        Ok(candidates.first().map(|w| (*w).clone()))
    }

    async fn find_team(&self, request: &TeamRequest) -> Result<Vec<Worker>, DirectoryError> {
        let workers = self.workers.lock().unwrap();
        let mut team: Vec<Worker> = workers
            .values()
            .filter(|w| w.status.is_assignable())
            .filter(|w| request.skills.iter().any(|s| w.skills.contains(s)))
            .cloned()
            .collect();
        team.sort_by_key(|w| w.current_load);
        team.truncate(request.size);
        Ok(team)
    }

    async fn update_status(&self, id: &str, status: WorkerStatus) -> Result<(), DirectoryError> {
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

    async fn record_metric(&self, id: &str, name: &str, value: f64) -> Result<(), DirectoryError> {
        self.metric_calls
            .lock()
            .unwrap()
            .push((id.to_string(), name.to_string(), value));
        Ok(())
    }

    async fn list_by_skill(&self, skill: &str) -> Result<Vec<Worker>, DirectoryError> {
        Ok(self
            .workers
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.skills.iter().any(|s| s == skill))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Worker>, DirectoryError> {
        Ok(self.workers.lock().unwrap().values().cloned().collect())
    }
}

/// Scripted broker: records enqueues, fails on demand, and lets tests
/// deliver jobs by firing transport events.
pub struct StubTransport {
    pub ready: AtomicBool,
    pub fail_enqueue: AtomicBool,
    pub jobs: Mutex<Vec<(DispatchJob, EnqueueOptions)>>,
    pub removed: Mutex<Vec<Uuid>>,
    tx: broadcast::Sender<TransportEvent>,
}

impl StubTransport {
    pub fn new(ready: bool) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(64);
        Arc::new(Self {
            ready: AtomicBool::new(ready),
            fail_enqueue: AtomicBool::new(false),
            jobs: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            tx,
        })
    }

    pub fn fire(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }

    /// Deliver the most recently enqueued job for a task.
    pub fn deliver(&self, task_id: Uuid) {
        let job = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(j, _)| j.task_id == task_id)
            .map(|(j, _)| j.clone())
            .expect("no enqueued job for task");
        self.fire(TransportEvent::Active { job });
    }

    pub fn enqueued(&self) -> Vec<(DispatchJob, EnqueueOptions)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueTransport for StubTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn enqueue(
        &self,
        job: &DispatchJob,
        opts: EnqueueOptions,
    ) -> Result<String, TransportError> {
        if self.fail_enqueue.load(Ordering::SeqCst) || !self.is_ready().await {
            return Err(TransportError::NotConnected);
        }
        self.jobs.lock().unwrap().push((job.clone(), opts));
        Ok(job.job_id.clone())
    }

    async fn remove(&self, task_id: Uuid) -> Result<bool, TransportError> {
        self.removed.lock().unwrap().push(task_id);
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|(j, _)| j.task_id != task_id);
        Ok(jobs.len() < before)
    }

    async fn list_jobs(&self, _states: &[JobState]) -> Result<Vec<DispatchJob>, TransportError> {
        Ok(self.jobs.lock().unwrap().iter().map(|(j, _)| j.clone()).collect())
    }

    async fn pause(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.tx.subscribe()
    }
}

/// Executor driven by a script of outcomes; once the script runs out it
/// succeeds with a stub payload.
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<serde_json::Value, String>>>,
}

impl ScriptedExecutor {
    pub fn always_ok() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
        })
    }

    pub fn scripted(
        outcomes: impl IntoIterator<Item = Result<serde_json::Value, String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        })
    }

    pub fn always_failing(error: &str) -> Arc<Self> {
        // An empty script succeeds, so pre-load plenty of failures.
        Self::scripted((0..32).map(|_| Err(error.to_string())))
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn run(&self, _task: &Task, worker_id: &str) -> Result<serde_json::Value, String> {
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(serde_json::json!({ "done_by": worker_id })),
        }
    }
}

pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub directory: Arc<StubDirectory>,
    pub transport: Option<Arc<StubTransport>>,
    pub events: EventBus,
}

impl Harness {
    pub fn store(&self) -> &Arc<TaskStore> {
        self.scheduler.store()
    }

    pub fn transport(&self) -> &Arc<StubTransport> {
        self.transport.as_ref().expect("harness has no transport")
    }
}

pub fn build_harness(
    directory: Arc<StubDirectory>,
    transport: Option<Arc<StubTransport>>,
    executor: Arc<ScriptedExecutor>,
) -> Harness {
    // Honors RUST_LOG when debugging a test; quiet otherwise.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let config = SchedulerConfig::default();
    let events = EventBus::new(config.event_channel_capacity);
    let store = TaskStore::new(config.clone(), Arc::new(NoopSink), events.clone());
    let scheduler = Scheduler::new(
        config,
        SchedulerDeps {
            store,
            directory: Arc::clone(&directory) as Arc<dyn WorkerDirectory>,
            transport: transport
                .clone()
                .map(|t| t as Arc<dyn QueueTransport>),
            executor,
            metrics: MetricRegistry::with_defaults(),
            events: events.clone(),
        },
    );
    Harness {
        scheduler,
        directory,
        transport,
        events,
    }
}

/// Wait until the bus delivers an event matching the predicate, returning
/// it. Events arriving before the subscription are not seen; subscribe
/// before acting.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<TaskEvent>,
    mut pred: impl FnMut(&TaskEvent) -> bool,
) -> TaskEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                break event;
            }
        }
    })
    .await
    .expect("expected event was not emitted")
}

/// Poll the store until a task reaches the expected status.
pub async fn wait_for_status(store: &TaskStore, task_id: Uuid, status: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.get_task(task_id).await.map(|t| t.status) == Some(status) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not reach expected status");
}
