//! Background population of the `future` field slot.
//!
//! [`FieldLoader`] owns a single-worker [`TaskQueue`], so loads run
//! strictly FIFO off the orchestrating thread. Each load reads one
//! time-slice through the storage collaborator, prepares a snapshot,
//! then, holding the window's future-slot lock, preloads it into the
//! GPU `future` buffer (publishing a fence) and publishes it on the CPU
//! side. A failed load leaves the slot stale.
//!
//! At most one load is in flight. A second
//! [`enqueue_load`](FieldLoader::enqueue_load) while one is running is
//! rejected with [`LoadError::AlreadyInFlight`].

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use advect_core::{
    FieldError, SourceHandles, StorageError, StorageReader, TimeIndex, VariableNames,
};
use advect_exec::{QueueError, QueueReport, TaskQueue};
use advect_field::{prepare, FieldSnapshot, FutureSlot, PrepareParams};
use advect_gpu::{FenceSlot, GpuBridge, GpuDevice, GpuError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, error, warn};

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from [`FieldLoader::enqueue_load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// A load is still running; at most one may be outstanding.
    AlreadyInFlight,
    /// The loader queue refused the task.
    Queue(QueueError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInFlight => write!(f, "a field load is already in flight"),
            Self::Queue(e) => write!(f, "loader queue: {e}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Queue(e) => Some(e),
            Self::AlreadyInFlight => None,
        }
    }
}

impl From<QueueError> for LoadError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

/// Why a load left the future slot untouched.
#[derive(Debug)]
pub enum LoadFailure {
    /// The storage collaborator failed.
    Storage(StorageError),
    /// The slice could not be prepared or does not fit the window.
    Field(FieldError),
    /// The GPU preload failed.
    Gpu(GpuError),
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Field(e) => write!(f, "field: {e}"),
            Self::Gpu(e) => write!(f, "gpu: {e}"),
        }
    }
}

impl Error for LoadFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Field(e) => Some(e),
            Self::Gpu(e) => Some(e),
        }
    }
}

impl From<StorageError> for LoadFailure {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<FieldError> for LoadFailure {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl From<GpuError> for LoadFailure {
    fn from(e: GpuError) -> Self {
        Self::Gpu(e)
    }
}

// ── PendingLoad ────────────────────────────────────────────────────

/// How a load ended.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The snapshot was published into the future slot.
    Completed {
        /// Time index of the published snapshot.
        time: TimeIndex,
    },
    /// The slot was left stale.
    Failed {
        /// Time index that was being loaded.
        time: TimeIndex,
        /// What went wrong.
        failure: LoadFailure,
    },
}

impl LoadOutcome {
    /// `true` for [`LoadOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Receipt for one enqueued load.
#[derive(Debug)]
pub struct PendingLoad {
    time: TimeIndex,
    frame: usize,
    handles: SourceHandles,
    done: Receiver<LoadOutcome>,
}

impl PendingLoad {
    /// Time index the load targets.
    pub fn time(&self) -> TimeIndex {
        self.time
    }

    /// Source frame number.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Sources being read.
    pub fn handles(&self) -> &SourceHandles {
        &self.handles
    }

    /// Block until the load ends or `timeout` elapses.
    ///
    /// Returns `None` on timeout, or if the outcome was already taken.
    pub fn wait(&self, timeout: Duration) -> Option<LoadOutcome> {
        match self.done.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The outcome, if the load has ended.
    pub fn try_outcome(&self) -> Option<LoadOutcome> {
        match self.done.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

// ── FieldLoader ────────────────────────────────────────────────────

/// Cumulative loader counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Loads accepted onto the queue.
    pub enqueued: u64,
    /// Loads that published a snapshot.
    pub completed: u64,
    /// Loads that left the slot stale.
    pub failed: u64,
    /// Enqueues rejected because a load was in flight.
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Clears the in-flight flag if a load task unwinds.
struct InFlightReset(Arc<AtomicBool>);

impl Drop for InFlightReset {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything a load task needs, cloned per task.
struct LoadJob<D: GpuDevice> {
    reader: Arc<dyn StorageReader>,
    names: VariableNames,
    params: PrepareParams,
    slot: Arc<FutureSlot>,
    bridge: Arc<GpuBridge<D>>,
    fences: Arc<FenceSlot>,
    in_flight: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<D: GpuDevice> LoadJob<D> {
    fn read(
        &self,
        handles: &SourceHandles,
        time: TimeIndex,
        frame: usize,
    ) -> Result<FieldSnapshot, LoadFailure> {
        let raw = self.reader.read_slice(handles, &self.names)?;
        Ok(prepare(&raw, &self.params, time, frame)?)
    }

    fn run(self, handles: SourceHandles, time: TimeIndex, frame: usize) -> LoadOutcome {
        let _reset = InFlightReset(Arc::clone(&self.in_flight));
        let start = Instant::now();
        let prepared = self.read(&handles, time, frame);

        let mut guard = self.slot.lock();
        let committed = prepared.and_then(|snapshot| {
            guard.check(&snapshot)?;
            self.bridge.preload(&snapshot, &self.fences)?;
            guard.publish(Arc::new(snapshot))?;
            Ok(())
        });
        let outcome = match committed {
            Ok(()) => LoadOutcome::Completed { time },
            Err(failure) => {
                guard.mark_stale();
                LoadOutcome::Failed { time, failure }
            }
        };
        // Cleared under the slot lock so a rotation sees a consistent
        // (freshness, in-flight) pair.
        self.in_flight.store(false, Ordering::Release);
        drop(guard);

        match &outcome {
            LoadOutcome::Completed { .. } => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    %time,
                    frame,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "field load completed"
                );
            }
            LoadOutcome::Failed { failure, .. } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(%time, frame, source = %handles.u, %failure, "field load failed; future slot left stale");
            }
        }
        outcome
    }
}

impl<D: GpuDevice> Clone for LoadJob<D> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            names: self.names.clone(),
            params: self.params.clone(),
            slot: Arc::clone(&self.slot),
            bridge: Arc::clone(&self.bridge),
            fences: Arc::clone(&self.fences),
            in_flight: Arc::clone(&self.in_flight),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Asynchronous filler of the window's `future` slot.
pub struct FieldLoader<D: GpuDevice> {
    queue: TaskQueue,
    job: LoadJob<D>,
    armed: bool,
}

impl<D: GpuDevice> FieldLoader<D> {
    /// Spawn the loader thread.
    pub fn new(
        reader: Arc<dyn StorageReader>,
        names: VariableNames,
        params: PrepareParams,
        slot: Arc<FutureSlot>,
        bridge: Arc<GpuBridge<D>>,
        fences: Arc<FenceSlot>,
    ) -> Result<Self, QueueError> {
        Ok(Self {
            queue: TaskQueue::new("advect-loader", 1)?,
            job: LoadJob {
                reader,
                names,
                params,
                slot,
                bridge,
                fences,
                in_flight: Arc::new(AtomicBool::new(false)),
                counters: Arc::new(Counters::default()),
            },
            armed: false,
        })
    }

    /// Queue a load of `handles` as time index `time`.
    pub fn enqueue_load(
        &mut self,
        handles: SourceHandles,
        time: TimeIndex,
        frame: usize,
    ) -> Result<PendingLoad, LoadError> {
        // Acquire pairs with the task's release store of `false`.
        if self.job.in_flight.load(Ordering::Acquire) {
            self.job.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(%time, frame, "field load rejected: previous load still in flight");
            return Err(LoadError::AlreadyInFlight);
        }
        self.job.in_flight.store(true, Ordering::Release);

        let (tx, rx) = bounded(1);
        let job = self.job.clone();
        let task_handles = handles.clone();
        if let Err(e) = self.queue.submit(move || {
            let outcome = job.run(task_handles, time, frame);
            // The receipt may have been dropped.
            let _ = tx.send(outcome);
        }) {
            self.job.in_flight.store(false, Ordering::Release);
            return Err(e.into());
        }
        self.armed = true;
        self.job.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(%time, frame, source = %handles.u, "field load enqueued");

        Ok(PendingLoad {
            time,
            frame,
            handles,
            done: rx,
        })
    }

    /// `true` while a load task is queued or running.
    pub fn is_in_flight(&self) -> bool {
        self.job.in_flight.load(Ordering::Acquire)
    }

    /// `true` if a load has been enqueued since the last
    /// [`disarm`](Self::disarm).
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Mark the outstanding load as consumed by a rotation.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Block until the loader queue is idle, up to `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_for_all_timeout(timeout)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LoaderStats {
        let c = &self.job.counters;
        LoaderStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }

    /// Finish queued loads and join the loader thread. Idempotent.
    pub fn shutdown(&mut self) -> QueueReport {
        self.queue.shutdown()
    }
}

impl<D: GpuDevice> fmt::Debug for FieldLoader<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldLoader")
            .field("in_flight", &self.is_in_flight())
            .field("armed", &self.armed)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advect_core::{GridDims, SourceHandle};
    use advect_field::{FieldWindow, Freshness};
    use advect_gpu::{FenceMode, HeadlessGpu};
    use advect_test_utils::{frames, MemoryReader};

    const DIMS: GridDims = GridDims {
        width: 4,
        height: 4,
        depth: 2,
    };

    struct Rig {
        window: FieldWindow,
        reader: Arc<MemoryReader>,
        handles: Vec<SourceHandles>,
        bridge: Arc<GpuBridge<HeadlessGpu>>,
        fences: Arc<FenceSlot>,
        loader: FieldLoader<HeadlessGpu>,
    }

    fn rig(frames_total: usize) -> Rig {
        let (reader, handles) = MemoryReader::tagged_series(DIMS, frames_total);
        let reader = Arc::new(reader);
        let mut window = FieldWindow::new(PrepareParams::default());
        let snap = |i: usize| {
            window
                .prepare(&frames::tagged(DIMS, i), TimeIndex(i as u64), i)
                .unwrap()
        };
        let (a, b) = (snap(0), snap(1));
        window.prime(a, Some(b)).unwrap();
        let bridge = Arc::new(
            GpuBridge::new(
                Arc::new(HeadlessGpu::new(FenceMode::Immediate)),
                &window,
                &[],
                Duration::from_millis(200),
            )
            .unwrap(),
        );
        let fences = Arc::new(FenceSlot::new());
        let loader = FieldLoader::new(
            reader.clone(),
            VariableNames::default(),
            window.params().clone(),
            Arc::clone(window.future_slot()),
            Arc::clone(&bridge),
            Arc::clone(&fences),
        )
        .unwrap();
        Rig {
            window,
            reader,
            handles,
            bridge,
            fences,
            loader,
        }
    }

    #[test]
    fn completed_load_publishes_and_fences() {
        let mut r = rig(3);
        let pending = r
            .loader
            .enqueue_load(r.handles[2].clone(), TimeIndex(2), 2)
            .unwrap();
        let outcome = pending.wait(Duration::from_secs(5)).unwrap();
        assert!(outcome.is_completed());
        assert_eq!(r.window.future_slot().freshness(), Freshness::Fresh);
        assert_eq!(r.window.future().unwrap().time(), TimeIndex(2));
        assert!(r.fences.is_pending());
        assert!(!r.loader.is_in_flight());
        assert!(r.loader.is_armed());
        assert_eq!(r.loader.stats().completed, 1);
        assert_eq!(r.bridge.stats().preloads, 1);
    }

    #[test]
    fn failed_load_leaves_slot_stale() {
        let mut r = rig(3);
        r.reader.fail("frame-2");
        let pending = r
            .loader
            .enqueue_load(r.handles[2].clone(), TimeIndex(2), 2)
            .unwrap();
        match pending.wait(Duration::from_secs(5)) {
            Some(LoadOutcome::Failed {
                failure: LoadFailure::Storage(_),
                ..
            }) => {}
            other => panic!("expected storage failure, got {other:?}"),
        }
        assert_eq!(r.window.future_slot().freshness(), Freshness::Stale);
        assert_eq!(r.window.future().unwrap().time(), TimeIndex(1));
        assert!(!r.fences.is_pending());
        assert_eq!(r.loader.stats().failed, 1);
    }

    #[test]
    fn mismatched_extents_are_not_preloaded() {
        let mut r = rig(3);
        let other = GridDims::new(2, 2, 2);
        r.reader.insert("odd", frames::tagged(other, 5));
        let pending = r
            .loader
            .enqueue_load(SourceHandles::single(SourceHandle::from("odd")), TimeIndex(2), 2)
            .unwrap();
        match pending.wait(Duration::from_secs(5)) {
            Some(LoadOutcome::Failed {
                failure: LoadFailure::Field(FieldError::DimensionMismatch { .. }),
                ..
            }) => {}
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
        assert_eq!(r.bridge.stats().preloads, 0);
    }

    #[test]
    fn second_enqueue_while_in_flight_is_rejected() {
        let mut r = rig(4);
        let gate = r.reader.gate();
        gate.close();
        let first = r
            .loader
            .enqueue_load(r.handles[2].clone(), TimeIndex(2), 2)
            .unwrap();
        assert_eq!(
            r.loader
                .enqueue_load(r.handles[3].clone(), TimeIndex(3), 3)
                .unwrap_err(),
            LoadError::AlreadyInFlight
        );
        assert_eq!(r.loader.stats().rejected, 1);
        gate.open();
        assert!(first.wait(Duration::from_secs(5)).unwrap().is_completed());
        assert!(r
            .loader
            .enqueue_load(r.handles[3].clone(), TimeIndex(3), 3)
            .is_ok());
    }

    #[test]
    fn shutdown_drains_queued_load() {
        let mut r = rig(3);
        let pending = r
            .loader
            .enqueue_load(r.handles[2].clone(), TimeIndex(2), 2)
            .unwrap();
        let report = r.loader.shutdown();
        assert_eq!(report.tasks_completed, 1);
        assert!(pending.try_outcome().unwrap().is_completed());
    }
}
