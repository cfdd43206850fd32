//! Task domain — model, bounded history, and the authoritative store.

pub mod history;
pub mod model;
pub mod store;

pub use history::{HistoryEntry, TaskHistory};
pub use model::{CommentKind, Task, TaskComment, TaskPriority, TaskSpec, TaskStatus, TaskUpdate};
pub use store::TaskStore;
