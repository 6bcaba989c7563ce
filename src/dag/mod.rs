// src/dag/mod.rs

//! Task records and the dependency graph.
//!
//! - [`graph`] holds the dependency edges and per-task readiness counters.
//! - [`task_info`] defines task records, states and outcomes.
//! - [`state_manager`] applies state transitions and propagates them to
//!   dependents (unlocking or cancelling).
//! - [`scheduler_step`] defines step results and state counters.

pub mod graph;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::DependencyGraph;
pub use scheduler_step::{SchedulerStats, SchedulerStep};
pub use state_manager::StateManager;
pub use task_info::{Dispatch, TaskError, TaskFailure, TaskOutcome, TaskRecord, TaskState};
