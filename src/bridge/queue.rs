//! Per-platform FIFO task runner.
//!
//! Each platform connection owns one [`TaskQueue`]. A dedicated worker task
//! drains it, running exactly one bridging task at a time to completion.
//! Failed or panicking tasks are logged and dropped; the worker moves on.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A boxed unit of bridging work.
pub type Task = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Handle for enqueueing onto one platform's worker.
#[derive(Clone)]
pub struct TaskQueue {
    name: &'static str,
    tx: mpsc::UnboundedSender<Task>,
    pending: Arc<AtomicUsize>,
}

impl TaskQueue {
    /// Create a queue and spawn its worker.
    ///
    /// The worker exits once every handle has been dropped and the
    /// remaining tasks have run.
    pub fn spawn(name: &'static str) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(run_worker(name, rx, pending.clone()));

        (Self { name, tx, pending }, worker)
    }

    /// Append a task. Never fails from the caller's point of view.
    pub fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Box::pin(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(queue = self.name, "Queue worker has stopped, dropping task");
        }
    }

    /// Tasks enqueued but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

async fn run_worker(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<Task>,
    pending: Arc<AtomicUsize>,
) {
    debug!(queue = name, "Queue worker started");

    while let Some(task) = rx.recv().await {
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(queue = name, "Caught error while executing task: {:#}", e),
            Err(_) => error!(queue = name, "Task panicked, continuing with next task"),
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }

    debug!(queue = name, "Queue worker stopped");
}
