//! The [`TaskQueue`] executor.
//!
//! Tasks are boxed closures pushed through an unbounded crossbeam
//! channel. Each worker thread loops on `recv()` and exits once the
//! sender is dropped and the channel has drained, so shutdown never
//! discards work that was accepted before it began.
//!
//! Completion is tracked by a pending counter guarded by a mutex and
//! paired with a condition variable. [`TaskQueue::wait_for_all`] blocks
//! on that condvar until the counter returns to zero.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error};

use crate::error::QueueError;

/// A unit of work accepted by the queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Upper bound on workers for any one queue.
const MAX_WORKERS: usize = 64;

// ── Pending counter ────────────────────────────────────────────────

/// Count of tasks submitted but not yet finished.
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    // The counter is a plain integer; a panic while holding the lock
    // cannot leave it half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn increment(&self) {
        *self.lock() += 1;
    }

    fn decrement(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.lock()
    }

    fn wait_zero(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self
                .drained
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_zero_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .drained
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

// ── Worker ─────────────────────────────────────────────────────────

/// Per-worker tallies returned through the join handle.
#[derive(Clone, Copy, Debug, Default)]
struct WorkerStats {
    completed: u64,
    panicked: u64,
}

fn worker_loop(queue: &str, rx: Receiver<Task>, pending: Arc<Pending>) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Ok(task) = rx.recv() {
        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => stats.completed += 1,
            Err(payload) => {
                stats.panicked += 1;
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".into());
                error!(queue, panic = %msg, "task panicked");
            }
        }
        pending.decrement();
    }
    stats
}

// ── TaskQueue ──────────────────────────────────────────────────────

/// Summary returned by [`TaskQueue::shutdown`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueReport {
    /// Tasks that ran to completion.
    pub tasks_completed: u64,
    /// Tasks that panicked (caught; the worker survived).
    pub tasks_panicked: u64,
    /// Worker threads joined cleanly.
    pub workers_joined: usize,
    /// Time spent draining and joining, in milliseconds.
    pub total_ms: u64,
}

/// A FIFO executor with a fixed number of worker threads.
///
/// With one worker, tasks run strictly in submission order. With more,
/// tasks are started in submission order but may finish in any order.
///
/// Do not call [`wait_for_all`](Self::wait_for_all) from inside a task
/// running on the same queue: the calling task is itself pending.
pub struct TaskQueue {
    name: String,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<WorkerStats>>,
    pending: Arc<Pending>,
    report: Option<QueueReport>,
}

impl TaskQueue {
    /// Spawn a queue with `workers` threads named `{name}-{i}`.
    ///
    /// `workers` is capped at 64.
    pub fn new(name: impl Into<String>, workers: usize) -> Result<Self, QueueError> {
        if workers == 0 {
            return Err(QueueError::NoWorkers);
        }
        let name = name.into();
        let workers = workers.min(MAX_WORKERS);
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let pending = Arc::new(Pending::new());

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = rx.clone();
            let pending = Arc::clone(&pending);
            let queue_name = name.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || worker_loop(&queue_name, rx, pending));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    // Close the channel so already-spawned workers exit.
                    drop(tx);
                    for h in handles {
                        let _ = h.join();
                    }
                    return Err(QueueError::SpawnFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(queue = %name, workers, "task queue started");

        Ok(Self {
            name,
            sender: Some(tx),
            workers: handles,
            pending,
            report: None,
        })
    }

    /// Queue name, used as the worker thread prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads (zero after shutdown).
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// `true` once [`shutdown`](Self::shutdown) has begun.
    pub fn is_shut_down(&self) -> bool {
        self.sender.is_none()
    }

    /// Enqueue a task. Fails with [`QueueError::ShutDown`] after shutdown.
    pub fn submit<F>(&self, task: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.sender.as_ref().ok_or(QueueError::ShutDown)?;
        // Count before sending so a fast worker cannot decrement first.
        self.pending.increment();
        if tx.send(Box::new(task)).is_err() {
            self.pending.decrement();
            return Err(QueueError::ShutDown);
        }
        Ok(())
    }

    /// Block until every task submitted so far has finished.
    pub fn wait_for_all(&self) {
        self.pending.wait_zero();
    }

    /// Like [`wait_for_all`](Self::wait_for_all) but gives up after
    /// `timeout`. Returns `true` if the queue drained.
    pub fn wait_for_all_timeout(&self, timeout: Duration) -> bool {
        self.pending.wait_zero_timeout(timeout)
    }

    /// Stop accepting tasks, let workers drain what is queued, and join
    /// them. Idempotent: later calls return the first report.
    pub fn shutdown(&mut self) -> QueueReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        let start = Instant::now();

        // Dropping the only sender closes the channel; workers exit after
        // the last queued task.
        self.sender.take();

        let mut report = QueueReport::default();
        for handle in self.workers.drain(..) {
            if let Ok(stats) = handle.join() {
                report.tasks_completed += stats.completed;
                report.tasks_panicked += stats.panicked;
                report.workers_joined += 1;
            }
        }
        report.total_ms = start.elapsed().as_millis() as u64;
        debug!(
            queue = %self.name,
            completed = report.tasks_completed,
            panicked = report.tasks_panicked,
            "task queue shut down"
        );
        self.report = Some(report.clone());
        report
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("workers", &self.workers.len())
            .field("pending", &self.pending.get())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// Compile-time assertion: the queue can be shared with tasks that submit
// follow-up work through an `Arc`.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TaskQueue>();
};
