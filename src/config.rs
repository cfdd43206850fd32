//! Configuration types.

use std::time::Duration;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of entries kept in task history.
    pub history_cap: usize,
    /// Fraction of `history_cap` retained after an overflow trim.
    pub history_trim_ratio: f64,
    /// Descriptions are truncated to this length when archived to history.
    pub history_description_max: usize,
    /// Timeout for individual durable-transport calls (enqueue, remove, list).
    pub transport_op_timeout: Duration,
    /// Execution timeout is `estimated_duration × this factor`.
    pub execution_timeout_factor: u32,
    /// Default maximum retry count for new tasks.
    pub default_max_retries: u32,
    /// Workers above this load are candidates for redistribution away.
    pub overloaded_threshold: u8,
    /// Workers below this load are candidates for redistribution toward.
    pub underloaded_threshold: u8,
    /// Capacity of the task event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_cap: 1000,
            history_trim_ratio: 0.8,
            history_description_max: 500,
            transport_op_timeout: Duration::from_secs(2),
            execution_timeout_factor: 2,
            default_max_retries: 3,
            overloaded_threshold: 80,
            underloaded_threshold: 20,
            event_channel_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    /// History length retained after an overflow trim.
    pub fn history_trim_target(&self) -> usize {
        (self.history_cap as f64 * self.history_trim_ratio) as usize
    }
}
