// src/exec/worker.rs

//! Worker pool.
//!
//! Each worker repeatedly claims a dispatch from the shared core, runs the
//! job in its own Tokio task (so a panic is contained and reported as a
//! failure), classifies the result and reports it back.

use std::any::Any;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::dag::{Dispatch, TaskFailure, TaskOutcome};
use crate::engine::scheduler::Shared;
use crate::exec::job::Cancelled;

/// Spawn `count` workers on the current runtime.
pub(crate) fn spawn_workers<T>(shared: &Arc<Shared<T>>, count: usize) -> Vec<JoinHandle<()>>
where
    T: Send + Sync + 'static,
{
    (0..count)
        .map(|index| {
            let span = info_span!("worker", scheduler = %shared.name(), worker = index);
            tokio::spawn(worker_loop(Arc::clone(shared)).instrument(span))
        })
        .collect()
}

async fn worker_loop<T>(shared: Arc<Shared<T>>)
where
    T: Send + Sync + 'static,
{
    debug!("worker started");

    while let Some(dispatch) = shared.next_dispatch().await {
        let id = dispatch.id;
        let outcome = execute(dispatch).await;
        shared.finish(id, outcome);
    }

    debug!("worker exiting; no dispatchable work left");
}

/// Run one job to completion and turn whatever happened into an outcome.
pub(crate) async fn execute<T>(dispatch: Dispatch<T>) -> TaskOutcome<T>
where
    T: Send + 'static,
{
    let Dispatch {
        id,
        label,
        priority,
        job,
        cancel,
    } = dispatch;

    let task_span = info_span!("task", task = %id, label = label.as_deref().unwrap_or(""));
    info!(task = %id, ?priority, "task started");

    let token = cancel.clone();
    let result = tokio::spawn(job.run(token).instrument(task_span)).await;

    match result {
        Ok(Ok(value)) => TaskOutcome::Completed(value),
        Ok(Err(err)) if err.downcast_ref::<Cancelled>().is_some() => {
            if !cancel.is_cancelled() {
                warn!(task = %id, "job reported cancellation without a request");
            }
            TaskOutcome::Cancelled
        }
        Ok(Err(err)) => {
            warn!(task = %id, error = %format!("{err:#}"), "job returned an error");
            TaskOutcome::Failed(TaskFailure::Error(Arc::new(err)))
        }
        Err(join_err) => classify_join_error(id, join_err),
    }
}

fn classify_join_error<T>(id: crate::types::TaskId, err: JoinError) -> TaskOutcome<T> {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        warn!(task = %id, panic = %message, "job panicked");
        TaskOutcome::Failed(TaskFailure::Panicked(message))
    } else {
        // Only happens when the runtime is shutting down underneath us.
        debug!(task = %id, "job aborted by runtime");
        TaskOutcome::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{BoxedJob, CancelToken, blocking};
    use crate::types::{Priority, TaskId};

    fn dispatch(job: BoxedJob<u32>) -> Dispatch<u32> {
        Dispatch {
            id: TaskId::new(1),
            label: Some("sample".into()),
            priority: Priority::Default,
            job,
            cancel: CancelToken::new(),
        }
    }

    #[tokio::test]
    async fn ok_is_completed() {
        let job: BoxedJob<u32> = Box::new(|_token: CancelToken| async { Ok::<u32, anyhow::Error>(5) });
        let outcome = execute(dispatch(job)).await;
        assert!(matches!(outcome, TaskOutcome::Completed(5)));
    }

    #[tokio::test]
    async fn error_is_failed() {
        let job: BoxedJob<u32> =
            Box::new(|_token: CancelToken| async { Err::<u32, _>(anyhow::anyhow!("disk full")) });
        match execute(dispatch(job)).await {
            TaskOutcome::Failed(TaskFailure::Error(err)) => {
                assert_eq!(err.to_string(), "disk full")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_marker_is_cancelled() {
        let d = dispatch(Box::new(|token: CancelToken| async move {
            token.cancelled().await;
            token.check()?;
            Ok::<u32, anyhow::Error>(0)
        }));
        d.cancel.request();
        let outcome = execute(d).await;
        assert!(matches!(outcome, TaskOutcome::Cancelled));
    }

    #[tokio::test]
    async fn panic_is_captured() {
        let job: BoxedJob<u32> = Box::new(|_token: CancelToken| async {
            if true {
                panic!("kaboom");
            }
            Ok::<u32, anyhow::Error>(0)
        });
        match execute(dispatch(job)).await {
            TaskOutcome::Failed(TaskFailure::Panicked(msg)) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blocking_panic_is_captured() {
        let job: BoxedJob<u32> = Box::new(blocking(|_token| -> anyhow::Result<u32> {
            panic!("sync kaboom {}", 1)
        }));
        match execute(dispatch(job)).await {
            TaskOutcome::Failed(TaskFailure::Panicked(msg)) => assert_eq!(msg, "sync kaboom 1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
