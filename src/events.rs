//! Task lifecycle events — broadcast fan-out to the surrounding product
//! (API layer, metrics). Observable, not part of core correctness.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::model::{Task, TaskStatus};

/// Events emitted by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated {
        task: Task,
    },
    TaskAssigned {
        task_id: Uuid,
        worker_id: String,
    },
    TaskStarted {
        task_id: Uuid,
        worker_id: String,
    },
    TaskStatusUpdated {
        task_id: Uuid,
        status: TaskStatus,
    },
    TaskCompleted {
        task_id: Uuid,
        worker_id: String,
        actual_duration_ms: u64,
    },
    TaskFailed {
        task_id: Uuid,
        error: String,
    },
    TaskRetry {
        task_id: Uuid,
        retry_count: u32,
        error: String,
    },
    TaskCancelled {
        task_id: Uuid,
    },
    TaskDeleted {
        task_id: Uuid,
    },
    TaskResolved {
        task_id: Uuid,
    },
    TaskReopened {
        task_id: Uuid,
        reason: String,
    },
    QueueError {
        message: String,
    },
}

/// Broadcast bus for task events. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to task events. Each consumer calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Fine if no receivers are listening.
    pub fn emit(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }
}
