//! Role-specific performance metrics — a lookup table from worker role to
//! metric-update strategy. New roles plug in without touching core logic.

use std::collections::HashMap;

use crate::task::model::Task;

/// A metric sample to record against a worker: (metric name, delta).
pub type MetricUpdate = (&'static str, f64);

/// Pure functions deciding which metric to bump for a role.
#[derive(Clone, Copy)]
pub struct MetricStrategy {
    /// Called when a task completes successfully.
    pub on_success: fn(&Task) -> Option<MetricUpdate>,
    /// Called when a task fails permanently.
    pub on_failure: fn(&Task) -> Option<MetricUpdate>,
}

/// Registry of role → metric strategy.
pub struct MetricRegistry {
    strategies: HashMap<String, MetricStrategy>,
    fallback: MetricStrategy,
}

impl MetricRegistry {
    /// Registry with the built-in role strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
            fallback: MetricStrategy {
                on_success: |_| Some(("tasks_completed", 1.0)),
                on_failure: |_| Some(("tasks_failed", 1.0)),
            },
        };

        registry.register(
            "developer",
            MetricStrategy {
                on_success: |_| Some(("features_completed", 1.0)),
                on_failure: |_| Some(("bug_rate", 0.05)),
            },
        );
        registry.register(
            "qa",
            MetricStrategy {
                on_success: |_| Some(("test_suites_completed", 1.0)),
                on_failure: |_| Some(("missed_defects", 1.0)),
            },
        );
        registry.register(
            "designer",
            MetricStrategy {
                on_success: |_| Some(("designs_delivered", 1.0)),
                on_failure: |_| Some(("revisions_required", 1.0)),
            },
        );

        registry
    }

    /// Register (or replace) the strategy for a role.
    pub fn register(&mut self, role: impl Into<String>, strategy: MetricStrategy) {
        self.strategies.insert(role.into(), strategy);
    }

    /// Strategy for a role, falling back to the generic counters.
    pub fn lookup(&self, role: &str) -> &MetricStrategy {
        self.strategies.get(role).unwrap_or(&self.fallback)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
