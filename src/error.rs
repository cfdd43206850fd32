//! Error types for the task scheduling engine.

use std::time::Duration;

use uuid::Uuid;

use crate::directory::WorkerStatus;
use crate::task::model::TaskStatus;

/// Top-level error type for the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    #[error("Worker {0} not found")]
    WorkerNotFound(String),

    #[error("Task {id} is {status}, cannot {operation}")]
    InvalidState {
        id: Uuid,
        status: TaskStatus,
        operation: &'static str,
    },

    #[error("Worker {id} is not assignable (status: {status})")]
    WorkerUnavailable { id: String, status: WorkerStatus },

    #[error("No worker matches skills [{}]", skills.join(", "))]
    NoCandidate { skills: Vec<String> },

    #[error("Execution of task {id} timed out after {timeout:?}")]
    Timeout { id: Uuid, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Malformed task spec — caller must fix the input, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    TitleEmpty,

    #[error("Title exceeds {max} characters (got {len})")]
    TitleTooLong { len: usize, max: usize },

    #[error("Description must not be empty")]
    DescriptionEmpty,

    #[error("Description exceeds {max} characters (got {len})")]
    DescriptionTooLong { len: usize, max: usize },

    #[error("Too many required skills: {count} > {max}")]
    TooManySkills { count: usize, max: usize },

    #[error("Skill name {skill:?} exceeds {max} characters")]
    SkillTooLong { skill: String, max: usize },

    #[error("Estimated duration {ms}ms is outside (0, {max_ms}ms]")]
    DurationOutOfRange { ms: u64, max_ms: u64 },

    #[error("A reason is required to reopen a task")]
    ReopenReasonMissing,
}

/// Durable queue transport errors — trigger fallback, logged, not surfaced
/// to the caller of `assign_task`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Queue transport is not connected")]
    NotConnected,

    #[error("Enqueue failed: {0}")]
    Enqueue(String),

    #[error("Job removal failed: {0}")]
    Remove(String),

    #[error("Queue operation failed: {0}")]
    Operation(String),
}

/// Worker Directory errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory lookup failed: {0}")]
    Lookup(String),

    #[error("Directory update failed: {0}")]
    Update(String),
}

/// Persistence sink errors — always swallowed (logged) by the store.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Snapshot write failed: {0}")]
    Write(String),
}

/// Result type alias for the scheduler.
pub type Result<T> = std::result::Result<T, Error>;
