// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`job`] defines what a task runs ([`Job`], [`blocking`]) and the
//!   cooperative [`CancelToken`] handed to it.
//! - [`worker`] owns the worker loop that pulls ready tasks from the
//!   scheduler core, runs them outside the core lock and reports back.

pub mod job;
pub(crate) mod worker;

pub use job::{Blocking, BoxedJob, CancelToken, Cancelled, Job, JobFuture, blocking};
