//! Workload accounting — how much of a worker's capacity one task costs,
//! and how task priority maps onto broker priority.

use crate::task::model::TaskPriority;

/// Reference duration for the workload scale: one hour.
const BASELINE_DURATION_MS: u64 = 3_600_000;

/// Duration multiplier cap. A day-long task costs no more than 2× base.
const DURATION_FACTOR_CAP: f64 = 2.0;

/// Base workload cost per priority.
pub fn priority_base(priority: TaskPriority) -> u8 {
    match priority {
        TaskPriority::Urgent => 30,
        TaskPriority::High => 20,
        TaskPriority::Medium => 15,
        TaskPriority::Low => 10,
    }
}

/// Workload delta charged to a worker at assignment:
/// `base(priority) × min(2, duration / 1h)`, rounded up.
///
/// The same delta is reversed at release (completion, terminal failure, or
/// cancellation), modulo the [0, 100] load clamp.
pub fn workload_delta(priority: TaskPriority, estimated_duration_ms: u64) -> u8 {
    let factor = (estimated_duration_ms as f64 / BASELINE_DURATION_MS as f64)
        .min(DURATION_FACTOR_CAP);
    let delta = (priority_base(priority) as f64 * factor).ceil();
    delta.min(100.0) as u8
}

/// Apply a delta to a load, clamped to [0, 100].
pub fn apply_load(load: u8, delta: u8) -> u8 {
    load.saturating_add(delta).min(100)
}

/// Reverse a delta from a load, clamped at 0.
pub fn release_load(load: u8, delta: u8) -> u8 {
    load.saturating_sub(delta)
}

/// Broker-level priority for a task priority (higher runs sooner).
pub fn transport_priority(priority: TaskPriority) -> i32 {
    match priority {
        TaskPriority::Urgent => 10,
        TaskPriority::High => 5,
        TaskPriority::Medium => 0,
        TaskPriority::Low => -5,
    }
}
