// src/errors.rs

//! Crate-wide error types.
//!
//! [`SchedulerError`] covers everything the scheduler itself can reject
//! (malformed submissions, unknown ids, timeouts, closed scheduler). What a
//! task's own work did is reported separately through
//! [`TaskOutcome`](crate::dag::TaskOutcome), so callers can tell "the task
//! failed" apart from "the request was wrong".

use std::time::Duration;

use thiserror::Error;

use crate::dag::TaskState;
use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Cyclic dependency: task {task} cannot depend on {dependency}")]
    CyclicDependency { task: TaskId, dependency: TaskId },

    #[error("Unknown dependency: {0}")]
    UnknownDependency(TaskId),

    #[error("Invalid state transition for task {task}: {from:?} -> {to:?}")]
    InvalidStateTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task {task} is still {state:?}; only finished tasks can be released")]
    NotTerminal { task: TaskId, state: TaskState },

    #[error("Timed out after {after:?} waiting for task {task}")]
    Timeout { task: TaskId, after: Duration },

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Scheduler is closed to new submissions")]
    SchedulerClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedulerError>;
