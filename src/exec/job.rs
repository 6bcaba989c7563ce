// src/exec/job.rs

//! The unit of work a task carries, and its cancellation handle.
//!
//! Any `FnOnce(CancelToken) -> impl Future<Output = anyhow::Result<T>>` is a
//! [`Job`]. Synchronous bodies can be wrapped with [`blocking`], which runs
//! them on Tokio's blocking pool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Notify;

/// Future returned by a running job.
pub type JobFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'static>>;

/// Work attached to a task. Consumed on dispatch, so it runs at most once.
pub trait Job<T>: Send + 'static {
    fn run(self: Box<Self>, token: CancelToken) -> JobFuture<T>;
}

impl<T, F, Fut> Job<T> for F
where
    F: FnOnce(CancelToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn run(self: Box<Self>, token: CancelToken) -> JobFuture<T> {
        Box::pin((*self)(token))
    }
}

pub type BoxedJob<T> = Box<dyn Job<T>>;

/// Marker error a job returns when it stops because cancellation was
/// requested. The worker classifies it as `Cancelled` rather than `Failed`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("task observed cancellation")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation handle shared between the scheduler and a job.
///
/// The scheduler only ever sets the flag. A job that never looks at it runs
/// to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation has been requested, for use with `?`
    /// at safe points inside a job.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation has been requested. Useful inside
    /// `tokio::select!`.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Set the flag and wake anyone in [`cancelled`](Self::cancelled).
    /// Returns `true` if this call was the one that set it.
    pub(crate) fn request(&self) -> bool {
        let first = !self.state.requested.swap(true, Ordering::AcqRel);
        if first {
            self.state.notify.notify_waiters();
        }
        first
    }
}

/// Job adapter for synchronous bodies.
pub struct Blocking<F>(F);

/// Run a synchronous closure on Tokio's blocking pool.
///
/// The closure still receives a [`CancelToken`] and should poll it between
/// units of work.
pub fn blocking<T, F>(f: F) -> Blocking<F>
where
    F: FnOnce(CancelToken) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Blocking(f)
}

impl<T, F> Job<T> for Blocking<F>
where
    F: FnOnce(CancelToken) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>, token: CancelToken) -> JobFuture<T> {
        let f = self.0;
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || f(token)).await {
                Ok(result) => result,
                // Re-raise so the worker reports it like any other panic.
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => Err(anyhow::Error::from(err)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_flips_after_request() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        assert!(token.request());
        assert!(!token.request());
        assert_eq!(token.check(), Err(Cancelled));
        assert!(token.clone().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.request();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn blocking_job_runs_on_pool() {
        let job: BoxedJob<u32> = Box::new(blocking(|_token| Ok::<u32, anyhow::Error>(41 + 1)));
        let value = job.run(CancelToken::new()).await.unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn cancelled_marker_survives_anyhow() {
        let err: anyhow::Error = Cancelled.into();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }
}
