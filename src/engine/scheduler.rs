// src/engine/scheduler.rs

//! Async façade over [`SchedulerCore`].
//!
//! A [`Scheduler`] owns a fixed pool of worker tasks. Callers submit work,
//! await outcomes and cancel tasks from any thread; every mutation takes the
//! core mutex briefly and never holds it across an `.await` or while a job
//! runs.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::dag::{Dispatch, SchedulerStats, SchedulerStep, TaskOutcome, TaskState};
use crate::engine::NewTask;
use crate::engine::core::SchedulerCore;
use crate::errors::{Result, SchedulerError};
use crate::exec::{CancelToken, worker};
use crate::types::{Priority, TaskId};

/// State shared between the façade, task handles and workers.
pub(crate) struct Shared<T> {
    core: Mutex<SchedulerCore<T>>,
    /// Woken whenever a task becomes ready or the scheduler closes.
    work_available: Notify,
    /// Number of non-terminal tasks, for `wait_idle`.
    outstanding: watch::Sender<usize>,
    name: String,
}

impl<T> Shared<T> {
    fn new(config: SchedulerConfig) -> Self {
        let name = config.name.clone();
        let (outstanding, _) = watch::channel(0);
        Self {
            core: Mutex::new(SchedulerCore::new(config)),
            work_available: Notify::new(),
            outstanding,
            name,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Lock the core. A panic while holding the lock cannot leave the tables
    /// half-updated in a way later calls depend on, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerCore<T>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish counters and wake workers after a mutation.
    fn after_step(&self, core: &SchedulerCore<T>, step: &SchedulerStep) {
        self.outstanding.send_replace(core.stats().outstanding());
        if !step.newly_ready.is_empty() || core.is_closed() {
            self.work_available.notify_waiters();
        }
    }

    /// Wait for the next task to run. `None` once the scheduler is closed and
    /// nothing is left that could become ready.
    pub(crate) async fn next_dispatch(&self) -> Option<Dispatch<T>> {
        loop {
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut core = self.lock();
                if let Some(dispatch) = core.dispatch_next() {
                    // A queued task may still be waiting for a free worker.
                    if core.queued() > 0 {
                        self.work_available.notify_one();
                    }
                    return Some(dispatch);
                }
                if core.workers_should_exit() {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Record a worker's report and sweep expired records.
    pub(crate) fn finish(&self, id: TaskId, outcome: TaskOutcome<T>) {
        let mut core = self.lock();
        match core.finish(id, outcome) {
            Ok(step) => {
                core.sweep_expired(Instant::now());
                self.after_step(&core, &step);
            }
            Err(err) => warn!(scheduler = %self.name, task = %id, error = %err, "dropping task report"),
        }
    }

    fn close(&self, drain_pending: bool) {
        let mut core = self.lock();
        let step = core.shutdown(drain_pending);
        self.after_step(&core, &step);
    }

    fn cancel(&self, id: TaskId) -> Result<TaskState> {
        let mut core = self.lock();
        let (state, step) = core.cancel(id)?;
        self.after_step(&core, &step);
        Ok(state)
    }

    fn status(&self, id: TaskId) -> Result<TaskState> {
        self.lock().status(id)
    }
}

type OutcomeReceiver<T> = watch::Receiver<Option<TaskOutcome<T>>>;

/// Wait on an outcome channel. The last published value survives the record
/// being evicted, so only a receiver that never saw an outcome fails.
async fn wait_on<T: Clone>(id: TaskId, mut outcomes: OutcomeReceiver<T>) -> Result<TaskOutcome<T>> {
    let outcome = match outcomes.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };
    outcome.ok_or(SchedulerError::NotFound(id))
}

async fn with_deadline<T>(
    id: TaskId,
    timeout: Duration,
    wait: impl Future<Output = Result<TaskOutcome<T>>>,
) -> Result<TaskOutcome<T>> {
    match tokio::time::timeout(timeout, wait).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SchedulerError::Timeout { task: id, after: timeout }),
    }
}

impl<T: Clone> Shared<T> {
    async fn wait(&self, id: TaskId) -> Result<TaskOutcome<T>> {
        let outcomes = self.lock().subscribe(id)?;
        wait_on(id, outcomes).await
    }
}

/// Dependency-aware concurrent task scheduler.
///
/// Tasks run on a pool of `max_concurrency` workers spawned on the current
/// Tokio runtime, in priority order once all their dependencies completed.
/// Dropping the scheduler closes it and cancels everything that has not
/// started; call [`shutdown`](Self::shutdown) to wait for workers instead.
pub struct Scheduler<T> {
    shared: Arc<Shared<T>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> Scheduler<T> {
    /// Start a scheduler and its workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: SchedulerConfig) -> Self {
        let workers = config.max_concurrency.max(1);
        info!(
            scheduler = %config.name,
            workers,
            default_priority = ?config.default_priority,
            cancelled_dependency = ?config.cancelled_dependency,
            retention = ?config.retention,
            "starting scheduler"
        );

        let shared = Arc::new(Shared::new(config));
        let handles = worker::spawn_workers(&shared, workers);
        Self {
            shared,
            workers: Mutex::new(handles),
        }
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.shared.lock().config().clone()
    }

    /// Submit a task with an explicit priority and dependency list.
    pub fn submit<F, Fut>(
        &self,
        f: F,
        priority: Priority,
        deps: impl IntoIterator<Item = TaskId>,
    ) -> Result<TaskHandle<T>>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit_task(NewTask::new(f).priority(priority).depends_on_all(deps))
    }

    /// Submit an independent task at the default priority.
    pub fn spawn<F, Fut>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit_task(NewTask::new(f))
    }

    pub fn submit_task(&self, task: NewTask<T>) -> Result<TaskHandle<T>> {
        let mut core = self.shared.lock();
        core.sweep_expired(Instant::now());
        let (id, step) = core.submit(task)?;
        self.shared.after_step(&core, &step);
        let outcome = core.subscribe(id).ok();
        Ok(self.handle_with(id, outcome))
    }

    /// Reserve an id other tasks can depend on before its work is known.
    pub fn reserve(&self) -> Result<TaskId> {
        let mut core = self.shared.lock();
        let id = core.reserve()?;
        self.shared.after_step(&core, &SchedulerStep::default());
        Ok(id)
    }

    /// Attach work to an id obtained from [`reserve`](Self::reserve).
    pub fn submit_reserved(&self, id: TaskId, task: NewTask<T>) -> Result<TaskHandle<T>> {
        let mut core = self.shared.lock();
        let step = core.submit_reserved(id, task)?;
        self.shared.after_step(&core, &step);
        let outcome = core.subscribe(id).ok();
        Ok(self.handle_with(id, outcome))
    }

    /// Handle for an id, e.g. one obtained from [`reserve`](Self::reserve).
    ///
    /// If the id is known, the handle keeps the task's outcome reachable even
    /// after the record is released or swept.
    pub fn handle(&self, id: TaskId) -> TaskHandle<T> {
        let outcome = self.shared.lock().subscribe(id).ok();
        self.handle_with(id, outcome)
    }

    fn handle_with(&self, id: TaskId, outcome: Option<OutcomeReceiver<T>>) -> TaskHandle<T> {
        TaskHandle {
            id,
            outcome,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait until the task reaches a terminal state.
    ///
    /// Fails with `NotFound` if the id is unknown or gets released.
    pub async fn wait(&self, id: TaskId) -> Result<TaskOutcome<T>> {
        self.shared.wait(id).await
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. The task itself
    /// is unaffected.
    pub async fn wait_timeout(&self, id: TaskId, timeout: Duration) -> Result<TaskOutcome<T>> {
        with_deadline(id, timeout, self.shared.wait(id)).await
    }

    /// Request cancellation; returns the task's state after the call.
    pub fn cancel(&self, id: TaskId) -> Result<TaskState> {
        self.shared.cancel(id)
    }

    /// Cancel every task that has not finished. Returns how many tasks were
    /// cancelled outright or signalled.
    pub fn cancel_all(&self) -> usize {
        let mut core = self.shared.lock();
        let step = core.cancel_all();
        self.shared.after_step(&core, &step);
        step.newly_cancelled.len() + step.cancel_requested.len()
    }

    pub fn status(&self, id: TaskId) -> Result<TaskState> {
        self.shared.status(id)
    }

    /// Drop the record of a finished task.
    pub fn release(&self, id: TaskId) -> Result<()> {
        let mut core = self.shared.lock();
        core.release(id)?;
        self.shared.after_step(&core, &SchedulerStep::default());
        Ok(())
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.lock().stats()
    }

    /// Wait until no task is pending, ready or running.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        // The sender lives in `shared`, which outlives this borrow.
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }

    /// Close the scheduler and wait for its workers to exit.
    ///
    /// With `drain_pending`, every submitted task still gets to run (reserved
    /// ids that never got work are cancelled). Without it, everything that
    /// has not started is cancelled and only running tasks finish.
    pub async fn shutdown(&self, drain_pending: bool) -> Result<()> {
        self.shared.close(drain_pending);

        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        debug!(scheduler = %self.name(), workers = handles.len(), "waiting for workers");

        let mut panicked = 0;
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(scheduler = %self.name(), error = %err, "worker did not exit cleanly");
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(anyhow::anyhow!("{panicked} worker(s) did not exit cleanly").into());
        }
        info!(scheduler = %self.name(), stats = ?self.stats(), "scheduler shut down");
        Ok(())
    }
}

impl<T> Drop for Scheduler<T> {
    fn drop(&mut self) {
        // Workers exit on their own once the queue drains; running jobs are
        // left to finish.
        self.shared.close(false);
    }
}

impl<T> std::fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

/// Handle to one submitted task.
///
/// Cheap to clone. Keeps the scheduler's tables alive but not its workers.
/// A handle subscribes to the task's outcome when it is created, so
/// [`wait`](Self::wait) still succeeds after the record has been released or
/// evicted by the retention window.
pub struct TaskHandle<T> {
    id: TaskId,
    outcome: Option<OutcomeReceiver<T>>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            outcome: self.outcome.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

impl<T: Clone> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub async fn wait(&self) -> Result<TaskOutcome<T>> {
        match &self.outcome {
            Some(outcome) => wait_on(self.id, outcome.clone()).await,
            None => self.shared.wait(self.id).await,
        }
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> Result<TaskOutcome<T>> {
        with_deadline(self.id, timeout, self.wait()).await
    }

    pub fn cancel(&self) -> Result<TaskState> {
        self.shared.cancel(self.id)
    }

    pub fn status(&self) -> Result<TaskState> {
        self.shared.status(self.id)
    }
}
