use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use advect_core::{
    GeoPositions, GridDims, PositionReader, RawSlice, SourceHandle, SourceHandles, StorageError,
    StorageReader, VariableNames,
};

use crate::frames;

/// A latch that blocks readers until opened.
#[derive(Default)]
pub struct ReadGate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl ReadGate {
    pub fn new_open() -> Self {
        Self {
            open: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    pub fn close(&self) {
        *self.open.lock().unwrap() = false;
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn pass(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

/// In-memory [`StorageReader`] keyed by the `u` handle.
///
/// Handles that are registered with [`fail`](MemoryReader::fail), or
/// that were never inserted, report [`StorageError::Open`]. A handle
/// inserted with an empty slice reads successfully and returns it.
pub struct MemoryReader {
    slices: Mutex<HashMap<String, RawSlice>>,
    failing: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    gate: Arc<ReadGate>,
    reads: AtomicU64,
}

impl Default for MemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReader {
    pub fn new() -> Self {
        Self {
            slices: Mutex::new(HashMap::new()),
            failing: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            gate: Arc::new(ReadGate::new_open()),
            reads: AtomicU64::new(0),
        }
    }

    /// A reader holding `count` [`frames::tagged`] slices under
    /// [`frames::handles`].
    pub fn tagged_series(dims: GridDims, count: usize) -> (Self, Vec<SourceHandles>) {
        let reader = Self::new();
        let handles = frames::handles(count);
        for (i, h) in handles.iter().enumerate() {
            reader.insert(&h.u.0, frames::tagged(dims, i));
        }
        (reader, handles)
    }

    pub fn insert(&self, handle: &str, slice: RawSlice) {
        self.slices.lock().unwrap().insert(handle.to_owned(), slice);
    }

    /// Make every future read of `handle` fail.
    pub fn fail(&self, handle: &str) {
        self.failing.lock().unwrap().push(handle.to_owned());
    }

    /// Undo [`fail`](Self::fail) for `handle`.
    pub fn heal(&self, handle: &str) {
        self.failing.lock().unwrap().retain(|h| h != handle);
    }

    /// Sleep this long inside every read.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Gate that every read passes through; close it to stall reads.
    pub fn gate(&self) -> Arc<ReadGate> {
        Arc::clone(&self.gate)
    }

    /// Number of reads attempted.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl StorageReader for MemoryReader {
    fn read_slice(
        &self,
        handles: &SourceHandles,
        _names: &VariableNames,
    ) -> Result<RawSlice, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.gate.pass();
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let key = &handles.u.0;
        if self.failing.lock().unwrap().iter().any(|h| h == key) {
            return Err(StorageError::Open {
                handle: key.clone(),
                reason: "injected failure".into(),
            });
        }
        self.slices
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Open {
                handle: key.clone(),
                reason: "no such slice".into(),
            })
    }
}

/// In-memory [`PositionReader`] returning one fixed set of positions.
pub struct MemoryPositions(pub GeoPositions);

impl PositionReader for MemoryPositions {
    fn read_positions(&self, _handle: &SourceHandle) -> Result<GeoPositions, StorageError> {
        Ok(self.0.clone())
    }
}
