//! Durable Queue Transport boundary — an external at-least-once job broker.
//!
//! The engine prefers durable dispatch and falls back to in-process
//! execution when the broker is unreachable. `DispatchMode` is the single
//! piece of state that dispatch logic branches on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::TransportError;

/// How task execution is currently dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Enqueue onto the durable broker.
    Durable,
    /// Execute in-process on the local runtime.
    Fallback,
}

/// One execution attempt in flight: {task, worker, transport job id}.
/// Transient — never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub task_id: Uuid,
    pub worker_id: String,
    /// Transport-assigned execution id.
    pub job_id: String,
}

/// Options for enqueueing a job.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Broker-level priority (higher runs sooner).
    pub priority: i32,
    /// Delay before the job becomes runnable, in milliseconds.
    pub delay_ms: u64,
}

/// Job states the broker can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

/// Lifecycle signals emitted by the broker.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Broker connection established (or re-established).
    Ready,
    /// A job was queued and is waiting.
    Waiting { job_id: String },
    /// A job should start executing now.
    Active { job: DispatchJob },
    /// The broker observed the job complete.
    Completed {
        job: DispatchJob,
        result: serde_json::Value,
    },
    /// The broker observed the job fail (includes stalled-then-failed jobs).
    Failed { job: DispatchJob, error: String },
    /// A job stalled (worker stopped reporting progress).
    Stalled { job: DispatchJob },
    /// Broker-level error.
    Error { message: String },
}

/// External durable queue interface.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Establish the broker connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whether the broker is currently reachable.
    async fn is_ready(&self) -> bool;

    /// Enqueue a job. Returns the transport-assigned job id.
    async fn enqueue(
        &self,
        job: &DispatchJob,
        opts: EnqueueOptions,
    ) -> Result<String, TransportError>;

    /// Best-effort removal of a job for the given task.
    /// Returns true if a job was found and removed.
    async fn remove(&self, task_id: Uuid) -> Result<bool, TransportError>;

    /// Jobs currently in any of the given states.
    async fn list_jobs(&self, states: &[JobState]) -> Result<Vec<DispatchJob>, TransportError>;

    /// Pause job processing.
    async fn pause(&self) -> Result<(), TransportError>;

    /// Resume job processing.
    async fn resume(&self) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Subscribe to broker lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
