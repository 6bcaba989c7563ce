// src/dag/task_info.rs

//! Task records, states and outcomes.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::watch;

use crate::exec::{BoxedJob, CancelToken};
use crate::types::{Priority, TaskId};

/// Lifecycle state of a task.
///
/// `Pending → Ready → Running → {Completed | Failed}`, with `Cancelled`
/// reachable from any non-terminal state. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting on at least one dependency (or a reserved placeholder).
    Pending,
    /// All dependencies completed; sitting in the ready queue.
    Ready,
    /// Claimed by a worker.
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Pending, Ready)
                | (Ready, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Ready, Cancelled)
                | (Running, Cancelled)
        )
    }
}

/// Why a task ended up `Failed`.
#[derive(Debug, Clone)]
pub enum TaskFailure {
    /// The job returned an error.
    Error(Arc<anyhow::Error>),
    /// The job panicked; the payload message is captured here.
    Panicked(String),
}

/// Terminal outcome of a task, shared with every awaiter.
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(TaskFailure),
    Cancelled,
}

/// Task-level error for callers that prefer `Result` over matching on
/// [`TaskOutcome`].
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled")]
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed(_) => TaskState::Completed,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            TaskOutcome::Completed(value) => Ok(value),
            TaskOutcome::Failed(TaskFailure::Error(err)) => Err(TaskError::Failed(err)),
            TaskOutcome::Failed(TaskFailure::Panicked(msg)) => Err(TaskError::Panicked(msg)),
            TaskOutcome::Cancelled => Err(TaskError::Cancelled),
        }
    }
}

/// Everything the scheduler knows about one task.
///
/// Owned exclusively by the scheduler core. Identity, priority and label are
/// fixed once the task is submitted; `state`, the cancel flag and the outcome
/// are the only fields that change afterwards.
pub struct TaskRecord<T> {
    pub id: TaskId,
    pub label: Option<String>,
    pub priority: Priority,
    /// Submission sequence, used for FIFO ordering within a priority band.
    pub seq: u64,
    /// Direct dependencies, as submitted.
    pub deps: Vec<TaskId>,
    pub state: TaskState,
    /// Taken by the worker on dispatch, so the job runs at most once.
    pub job: Option<BoxedJob<T>>,
    pub cancel: CancelToken,
    /// `true` while the id is reserved but no work has been submitted yet.
    pub placeholder: bool,
    pub finished_at: Option<Instant>,
    outcome: watch::Sender<Option<TaskOutcome<T>>>,
}

impl<T> TaskRecord<T> {
    /// A reserved id with no work attached yet.
    pub fn placeholder(id: TaskId) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            id,
            label: None,
            priority: Priority::default(),
            seq: 0,
            deps: Vec::new(),
            state: TaskState::Pending,
            job: None,
            cancel: CancelToken::new(),
            placeholder: true,
            finished_at: None,
            outcome,
        }
    }

    /// Attach work to this record; it stays `Pending` until the core decides
    /// whether it is ready.
    pub fn fill(
        &mut self,
        job: BoxedJob<T>,
        priority: Priority,
        seq: u64,
        deps: Vec<TaskId>,
        label: Option<String>,
    ) {
        self.job = Some(job);
        self.priority = priority;
        self.seq = seq;
        self.deps = deps;
        self.label = label;
        self.placeholder = false;
    }

    /// Subscribe to the terminal outcome of this task.
    pub fn subscribe(&self) -> watch::Receiver<Option<TaskOutcome<T>>> {
        self.outcome.subscribe()
    }

    /// Clone of the outcome, once terminal.
    pub fn outcome(&self) -> Option<TaskOutcome<T>>
    where
        T: Clone,
    {
        self.outcome.borrow().clone()
    }

    /// Store the terminal outcome and wake every awaiter. Called exactly
    /// once, by the state manager, on the terminal transition.
    pub(crate) fn publish(&mut self, outcome: TaskOutcome<T>, now: Instant) {
        self.finished_at = Some(now);
        self.job = None;
        self.outcome.send_replace(Some(outcome));
    }

    /// Human-readable name for logs.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => format!("{}({})", self.id, label),
            None => self.id.to_string(),
        }
    }
}

impl<T> std::fmt::Debug for TaskRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .field("deps", &self.deps)
            .field("state", &self.state)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

/// A task claimed by a worker: the job plus what it needs to run it.
pub struct Dispatch<T> {
    pub id: TaskId,
    pub label: Option<String>,
    pub priority: Priority,
    pub job: BoxedJob<T>,
    pub cancel: CancelToken,
}

impl<T> std::fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
