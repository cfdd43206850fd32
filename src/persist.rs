//! Persistence sink boundary — best-effort snapshots of task state.
//!
//! Snapshot writes are fire-and-forget: failures are logged by the store
//! and never propagated, so storage hiccups cannot destabilize scheduling.

use async_trait::async_trait;

use crate::error::PersistError;
use crate::task::model::Task;

/// Asynchronous snapshot sink for all active task state.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save_snapshot(&self, tasks: Vec<Task>) -> Result<(), PersistError>;
}

/// A sink that discards snapshots. Useful when the surrounding product
/// runs the engine purely in memory.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl PersistenceSink for NoopSink {
    async fn save_snapshot(&self, _tasks: Vec<Task>) -> Result<(), PersistError> {
        Ok(())
    }
}
