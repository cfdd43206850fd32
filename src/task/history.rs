//! Bounded task history — an append-only projection of terminal tasks.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Task, TaskComment, TaskPriority, TaskStatus};

/// A size-capped projection of a task that reached a terminal state.
///
/// Descriptions are truncated to bound memory; the live `Task` keeps the
/// full text for as long as it stays in the active store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<TaskComment>,
    pub created_at: DateTime<Utc>,
    /// When the entry was archived.
    pub archived_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Project a terminal task, truncating the description to `max_description`.
    pub fn from_task(task: &Task, max_description: usize) -> Self {
        let description = if task.description.chars().count() > max_description {
            task.description.chars().take(max_description).collect()
        } else {
            task.description.clone()
        };

        Self {
            task_id: task.id,
            title: task.title.clone(),
            description,
            status: task.status,
            priority: task.priority,
            assigned_to: task.assigned_to.clone(),
            retry_count: task.retry_count,
            error: task.error.clone(),
            actual_duration_ms: task.actual_duration_ms,
            comments: task.comments.clone(),
            created_at: task.created_at,
            archived_at: Utc::now(),
        }
    }
}

/// Fixed-capacity history ring with O(1) append and O(1) trim.
///
/// On overflow the oldest entries are dropped until `trim_target` entries
/// remain, atomically with the append that triggered it.
#[derive(Debug)]
pub struct TaskHistory {
    entries: VecDeque<HistoryEntry>,
    cap: usize,
    trim_target: usize,
}

impl TaskHistory {
    pub fn new(cap: usize, trim_target: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(1024)),
            cap,
            trim_target: trim_target.min(cap),
        }
    }

    /// Append an entry, trimming the oldest entries on overflow.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        if self.entries.len() > self.cap {
            while self.entries.len() > self.trim_target {
                self.entries.pop_front();
            }
        }
    }

    /// Most recent entries first, up to `limit` (0 = all).
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let take = if limit == 0 { self.entries.len() } else { limit };
        self.entries.iter().rev().take(take).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
