//! Scheduling core — assignment, execution, recovery, and fleet operations.
//!
//! Components:
//! - `workload` — workload delta math and broker priority mapping
//! - `engine` — `Scheduler`: worker selection and dual-mode dispatch
//! - `runner` — `ExecutionRunner`: one bounded execution attempt
//! - `recovery` — `RecoveryCoordinator`: retry/give-up and resource release
//! - `fleet` — batch operations (team assignment, redistribution, recommendations)

pub mod engine;
pub mod fleet;
pub mod recovery;
pub mod runner;
pub mod workload;

pub use engine::{Scheduler, SchedulerDeps};
pub use fleet::{FleetOps, Recommendation, TeamAssignmentReport};
pub use recovery::RecoveryCoordinator;
pub use runner::{ExecutionRunner, TaskExecutor};
