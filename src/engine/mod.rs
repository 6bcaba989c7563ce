// src/engine/mod.rs

//! Scheduling engine.
//!
//! - [`queue`] is the priority-ordered ready queue.
//! - [`core`] is the synchronous state machine: submission, dispatch,
//!   completion, cancellation and shutdown over the task tables.
//! - [`scheduler`] is the async façade callers use. It wraps the core in a
//!   mutex and drives a fixed pool of workers.

use std::future::Future;

use crate::exec::{BoxedJob, CancelToken, Job};
use crate::types::{Priority, TaskId};

pub mod core;
pub mod queue;
pub mod scheduler;

pub use self::core::SchedulerCore;
pub use queue::ReadyQueue;
pub use scheduler::{Scheduler, TaskHandle};

/// A task description ready to be submitted.
///
/// ```no_run
/// # use dagqueue::{NewTask, Priority, TaskId};
/// # fn demo(upstream: TaskId) -> NewTask<u32> {
/// NewTask::new(|token| async move {
///     token.check()?;
///     Ok::<u32, anyhow::Error>(42)
/// })
/// .priority(Priority::UserInitiated)
/// .depends_on(upstream)
/// .label("answer")
/// # }
/// ```
pub struct NewTask<T> {
    pub(crate) job: BoxedJob<T>,
    pub(crate) priority: Option<Priority>,
    pub(crate) deps: Vec<TaskId>,
    pub(crate) label: Option<String>,
}

impl<T: 'static> NewTask<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_job(f)
    }

    /// Wrap any [`Job`], e.g. one built with [`blocking`](crate::exec::blocking).
    pub fn from_job(job: impl Job<T>) -> Self {
        Self {
            job: Box::new(job),
            priority: None,
            deps: Vec::new(),
            label: None,
        }
    }

    /// Override the scheduler's default priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, dep: TaskId) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn depends_on_all(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.deps.extend(deps);
        self
    }

    /// Human-readable name used in logs.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl<T> std::fmt::Debug for NewTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewTask")
            .field("priority", &self.priority)
            .field("deps", &self.deps)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
