//! Task data model — the unit of schedulable work, its lifecycle, and
//! creation/update specs with validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum title length.
pub const TITLE_MAX: usize = 200;
/// Maximum description length.
pub const DESCRIPTION_MAX: usize = 10_000;
/// Maximum number of required skills.
pub const SKILLS_MAX: usize = 20;
/// Maximum length of a single skill name.
pub const SKILL_LEN_MAX: usize = 50;
/// Maximum estimated duration: 24 hours.
pub const DURATION_MAX_MS: u64 = 86_400_000;

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

/// Current lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be assigned (or re-assigned after a retryable failure).
    Pending,
    /// Bound to a worker, not yet executing.
    Assigned,
    /// Execution started.
    InProgress,
    /// Execution succeeded.
    Completed,
    /// Permanently failed (retry budget exhausted).
    Failed,
    /// Completed and signed off.
    Resolved,
}

impl TaskStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, Assigned) |
            // From Assigned
            (Assigned, InProgress) | (Assigned, Pending) | (Assigned, Failed) |
            // From InProgress
            (InProgress, Completed) | (InProgress, Failed) | (InProgress, Pending) |
            // Sign-off and reopen
            (Completed, Resolved) | (Completed, Pending) | (Resolved, Pending)
        )
    }

    /// Terminal statuses: no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Resolved)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Resolved => "resolved",
        };
        write!(f, "{s}")
    }
}

/// Kind of audit-trail comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Resolution,
    ReopenReason,
}

/// An audit-trail comment (resolution reasons, reopen reasons).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComment {
    pub kind: CommentKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl TaskComment {
    pub fn new(kind: CommentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A unit of schedulable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID, assigned at creation.
    pub id: Uuid,
    /// Short title (≤200 chars).
    pub title: String,
    /// Longer description (≤10,000 chars).
    pub description: String,
    /// Skills a worker needs to execute this task.
    pub required_skills: Vec<String>,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Estimated duration in milliseconds (0 < d ≤ 24h).
    pub estimated_duration_ms: u64,
    /// Maximum retry count before the task fails permanently.
    pub max_retries: u32,
    /// Tasks that must complete before this one is eligible for pickup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Uuid>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Structured metadata.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Worker currently bound to this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Number of failures recorded so far (monotonic).
    pub retry_count: u32,
    /// Workload delta charged to the worker at assignment, reversed at release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_cost: Option<u8>,
    /// Execution result, present once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Last execution error, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration_ms: Option<u64>,
    /// Audit trail of resolution/reopen comments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<TaskComment>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reopened_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a task from a validated spec.
    pub fn from_spec(spec: TaskSpec, default_max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: spec.title,
            description: spec.description,
            required_skills: spec.required_skills,
            priority: spec.priority,
            status: TaskStatus::Pending,
            estimated_duration_ms: spec.estimated_duration_ms,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            dependencies: spec.dependencies,
            tags: spec.tags,
            metadata: spec.metadata,
            assigned_to: None,
            retry_count: 0,
            workload_cost: None,
            result: None,
            error: None,
            actual_duration_ms: None,
            comments: Vec::new(),
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            resolved_at: None,
            reopened_at: None,
        }
    }
}

/// Spec for creating a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub estimated_duration_ms: u64,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TaskSpec {
    /// Create a new spec with defaults (medium priority, engine-default retries).
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        estimated_duration_ms: u64,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            required_skills: Vec::new(),
            priority: TaskPriority::default(),
            estimated_duration_ms,
            max_retries: None,
            dependencies: Vec::new(),
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Builder: set required skills.
    pub fn with_skills(mut self, skills: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set max retries.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Builder: set dependency task ids.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Uuid>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    /// Builder: set tags.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate the spec against the task constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_description(&self.description)?;
        validate_skills(&self.required_skills)?;
        validate_duration(self.estimated_duration_ms)?;
        Ok(())
    }
}

/// Allow-listed partial update for an existing task.
///
/// Only these fields may be mutated from the outside; lifecycle fields move
/// exclusively through the documented store/engine operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub required_skills: Option<Vec<String>>,
    #[serde(default)]
    pub estimated_duration_ms: Option<u64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl TaskUpdate {
    /// Validate the fields that are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(skills) = &self.required_skills {
            validate_skills(skills)?;
        }
        if let Some(ms) = self.estimated_duration_ms {
            validate_duration(ms)?;
        }
        Ok(())
    }

    /// Apply the present fields to a task.
    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(skills) = self.required_skills {
            task.required_skills = skills;
        }
        if let Some(ms) = self.estimated_duration_ms {
            task.estimated_duration_ms = ms;
        }
        if let Some(tags) = self.tags {
            task.tags = tags;
        }
        if let Some(metadata) = self.metadata {
            task.metadata = metadata;
        }
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if title.chars().count() > TITLE_MAX {
        return Err(ValidationError::TitleTooLong {
            len: title.chars().count(),
            max: TITLE_MAX,
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.trim().is_empty() {
        return Err(ValidationError::DescriptionEmpty);
    }
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(ValidationError::DescriptionTooLong {
            len: description.chars().count(),
            max: DESCRIPTION_MAX,
        });
    }
    Ok(())
}

fn validate_skills(skills: &[String]) -> Result<(), ValidationError> {
    if skills.len() > SKILLS_MAX {
        return Err(ValidationError::TooManySkills {
            count: skills.len(),
            max: SKILLS_MAX,
        });
    }
    for skill in skills {
        if skill.chars().count() > SKILL_LEN_MAX {
            return Err(ValidationError::SkillTooLong {
                skill: skill.clone(),
                max: SKILL_LEN_MAX,
            });
        }
    }
    Ok(())
}

fn validate_duration(ms: u64) -> Result<(), ValidationError> {
    if ms == 0 || ms > DURATION_MAX_MS {
        return Err(ValidationError::DurationOutOfRange {
            ms,
            max_ms: DURATION_MAX_MS,
        });
    }
    Ok(())
}
