//! taskgrid — task scheduling and lifecycle engine.

pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod metrics;
pub mod persist;
pub mod sched;
pub mod task;
pub mod transport;
