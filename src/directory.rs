//! Worker Directory boundary — the external registry that owns worker
//! status and load. The engine only issues update requests through this
//! trait; it never mutates worker state itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DirectoryError;
use crate::task::model::TaskPriority;

/// Availability status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Available,
    Busy,
    Offline,
}

impl WorkerStatus {
    /// Offline workers cannot take new assignments; busy workers can, up to
    /// their load cap.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
        };
        write!(f, "{s}")
    }
}

/// A worker as reported by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Directory-assigned ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Role string, keys into the metric strategy table.
    pub role: String,
    /// Skills this worker offers.
    pub skills: Vec<String>,
    /// Availability.
    pub status: WorkerStatus,
    /// Capacity proxy in [0, 100].
    pub current_load: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Worker {
    /// Number of the given skills this worker covers.
    pub fn skill_overlap(&self, required: &[String]) -> usize {
        required
            .iter()
            .filter(|s| self.skills.iter().any(|have| have == *s))
            .count()
    }
}

/// Criteria for requesting a team of workers.
#[derive(Debug, Clone, Default)]
pub struct TeamRequest {
    pub skills: Vec<String>,
    pub size: usize,
    pub department: Option<String>,
}

/// External Worker Directory interface.
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    /// Resolve a worker by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<Worker>, DirectoryError>;

    /// Best worker for a required skill set and priority, if any.
    async fn find_best_match(
        &self,
        skills: &[String],
        priority: TaskPriority,
    ) -> Result<Option<Worker>, DirectoryError>;

    /// A team of candidate workers for the given criteria.
    async fn find_team(&self, request: &TeamRequest) -> Result<Vec<Worker>, DirectoryError>;

    /// Update a worker's availability status.
    async fn update_status(&self, id: &str, status: WorkerStatus) -> Result<(), DirectoryError>;

    /// Set a worker's load (callers pre-clamp to [0, 100]).
    async fn update_load(&self, id: &str, new_load: u8) -> Result<(), DirectoryError>;

    /// Record that a task was assigned to a worker.
    async fn assign_project(&self, id: &str, task_id: Uuid) -> Result<(), DirectoryError>;

    /// Record that a task was released from a worker.
    async fn remove_project(&self, id: &str, task_id: Uuid) -> Result<(), DirectoryError>;

    /// Record a performance metric sample for a worker.
    async fn record_metric(&self, id: &str, name: &str, value: f64)
        -> Result<(), DirectoryError>;

    /// All workers holding the given skill.
    async fn list_by_skill(&self, skill: &str) -> Result<Vec<Worker>, DirectoryError>;

    /// All workers.
    async fn list_all(&self) -> Result<Vec<Worker>, DirectoryError>;
}
