#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use dagqueue::{CancelToken, Cancelled, NewTask};

#[derive(Debug, Default)]
struct Record {
    started: Vec<String>,
    finished: Vec<String>,
    running: usize,
    peak: usize,
}

/// Tracks what its tasks did: start/finish order and how many ran at
/// once.
#[derive(Debug, Clone)]
pub struct Recorder {
    record: Arc<Mutex<Record>>,
    started_count: Arc<watch::Sender<usize>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        let (started_count, _) = watch::channel(0);
        Self {
            record: Arc::new(Mutex::new(Record::default())),
            started_count: Arc::new(started_count),
        }
    }

    fn enter(&self, label: &str) {
        let started = {
            let mut r = self.record.lock().unwrap();
            r.started.push(label.to_string());
            r.running += 1;
            r.peak = r.peak.max(r.running);
            r.started.len()
        };
        self.started_count.send_replace(started);
    }

    fn exit(&self, label: &str) {
        let mut r = self.record.lock().unwrap();
        r.running -= 1;
        r.finished.push(label.to_string());
    }

    /// Labels in the order their jobs started.
    pub fn started(&self) -> Vec<String> {
        self.record.lock().unwrap().started.clone()
    }

    /// Labels in the order their jobs returned successfully.
    pub fn finished(&self) -> Vec<String> {
        self.record.lock().unwrap().finished.clone()
    }

    /// Highest number of recorder jobs observed running at the same time.
    pub fn peak(&self) -> usize {
        self.record.lock().unwrap().peak
    }

    /// Wait until at least `n` recorder jobs have started.
    pub async fn wait_started(&self, n: usize) {
        let mut rx = self.started_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// A task that sleeps for `hold` (ignoring cancellation) and returns
    /// `value`.
    pub fn task<T>(&self, label: &str, value: T, hold: Duration) -> NewTask<T>
    where
        T: Send + 'static,
    {
        let recorder = self.clone();
        let name = label.to_string();
        NewTask::new(move |_token: CancelToken| async move {
            recorder.enter(&name);
            tokio::time::sleep(hold).await;
            recorder.exit(&name);
            Ok::<T, anyhow::Error>(value)
        })
        .label(label)
    }

    /// A task that blocks until `gate` opens, then returns `value`.
    pub fn gated<T>(&self, label: &str, value: T, gate: &Gate) -> NewTask<T>
    where
        T: Send + 'static,
    {
        let recorder = self.clone();
        let name = label.to_string();
        let label = label.to_string();
        let gate = gate.clone();
        NewTask::new(move |_token: CancelToken| async move {
            recorder.enter(&label);
            gate.wait().await;
            recorder.exit(&label);
            Ok::<T, anyhow::Error>(value)
        })
        .label(name)
    }

    /// A task that runs until cancellation is requested, then stops with
    /// the `Cancelled` marker.
    pub fn cooperative<T>(&self, label: &str) -> NewTask<T>
    where
        T: Send + 'static,
    {
        let recorder = self.clone();
        let name = label.to_string();
        let label = label.to_string();
        NewTask::new(move |token: CancelToken| async move {
            recorder.enter(&label);
            token.cancelled().await;
            recorder.record.lock().unwrap().running -= 1;
            Err::<T, _>(anyhow::Error::from(Cancelled))
        })
        .label(name)
    }

    /// A task that fails with `message` after recording its start.
    pub fn failing<T>(&self, label: &str, message: &str) -> NewTask<T>
    where
        T: Send + 'static,
    {
        let recorder = self.clone();
        let name = label.to_string();
        let label = label.to_string();
        let message = message.to_string();
        NewTask::new(move |_token: CancelToken| async move {
            recorder.enter(&label);
            recorder.record.lock().unwrap().running -= 1;
            Err::<T, _>(anyhow::anyhow!(message))
        })
        .label(name)
    }
}

/// A one-shot barrier tests open to let gated tasks finish.
#[derive(Debug, Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}
