//! The triple-buffered field window.
//!
//! Roles:
//!
//! - `prev` and `current` are owned by the window and frozen. They are
//!   the interpolation pair: fraction 0 reproduces `prev`, and fractions
//!   approaching 1 approach `current`.
//! - `future` lives in a [`FutureSlot`] shared with the loader thread,
//!   which is its only writer.
//!
//! [`FieldWindow::rotate`] shifts `current` into `prev` and promotes the
//! snapshot held by the future slot. The slot keeps pointing at the
//! promoted snapshot, marked [`Freshness::Stale`], until the loader
//! publishes the next one. Rotating onto a stale slot freezes the field
//! for one interval; the window logs it and carries on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use advect_core::{FieldError, GridDims, RawSlice, TimeIndex, Vec3};
use tracing::{debug, warn};

use crate::sample::{clamp_fraction, WindowSampler};
use crate::snapshot::{prepare, push_edge, FieldSnapshot, PrepareParams};

// ── FutureSlot ─────────────────────────────────────────────────────

/// State of the future slot relative to the last rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Nothing has ever been placed in the slot.
    Vacant,
    /// Holds a snapshot published since the last rotation.
    Fresh,
    /// Holds the snapshot already promoted by the last rotation, or a
    /// failed load left it unchanged.
    Stale,
}

#[derive(Debug)]
struct FutureState {
    snapshot: Option<Arc<FieldSnapshot>>,
    freshness: Freshness,
    dims: Option<GridDims>,
}

/// The loader-owned `future` slot.
///
/// The loader publishes into it; the orchestrator takes from it during
/// rotation. Both sides hold the mutex only for an `Arc` swap, except
/// when the loader commits GPU work together with the snapshot through
/// [`FutureSlot::lock`].
#[derive(Debug)]
pub struct FutureSlot {
    state: Mutex<FutureState>,
}

impl Default for FutureSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FutureState {
                snapshot: None,
                freshness: Freshness::Vacant,
                dims: None,
            }),
        }
    }

    /// Lock the slot. Snapshots are replaced whole, so a poisoned lock
    /// still guards a consistent value.
    pub fn lock(&self) -> FutureGuard<'_> {
        FutureGuard {
            slot: self,
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Publish a freshly loaded snapshot. See [`FutureGuard::publish`].
    pub fn publish(&self, snapshot: Arc<FieldSnapshot>) -> Result<(), FieldError> {
        self.lock().publish(snapshot)
    }

    /// Record that a load failed; the previous contents stay in place.
    pub fn mark_stale(&self) {
        self.lock().mark_stale();
    }

    /// Current freshness.
    pub fn freshness(&self) -> Freshness {
        self.lock().freshness()
    }

    /// The snapshot currently held, if any.
    pub fn snapshot(&self) -> Option<Arc<FieldSnapshot>> {
        self.lock().snapshot()
    }
}

/// Exclusive access to a [`FutureSlot`].
pub struct FutureGuard<'a> {
    slot: &'a FutureSlot,
    state: MutexGuard<'a, FutureState>,
}

impl FutureGuard<'_> {
    /// Replace the slot contents and mark them fresh.
    ///
    /// Fails with [`FieldError::DimensionMismatch`] if the window has
    /// been primed with snapshots of different extents.
    pub fn publish(&mut self, snapshot: Arc<FieldSnapshot>) -> Result<(), FieldError> {
        self.check(&snapshot)?;
        self.state.snapshot = Some(snapshot);
        self.state.freshness = Freshness::Fresh;
        Ok(())
    }

    /// Would [`publish`](Self::publish) accept `snapshot`?
    pub fn check(&self, snapshot: &FieldSnapshot) -> Result<(), FieldError> {
        match self.state.dims {
            Some(expected) if snapshot.dims() != expected => Err(FieldError::DimensionMismatch {
                expected,
                found: snapshot.dims(),
            }),
            _ => Ok(()),
        }
    }

    /// Mark the slot stale without touching its snapshot.
    pub fn mark_stale(&mut self) {
        if self.state.freshness != Freshness::Vacant {
            self.state.freshness = Freshness::Stale;
        }
    }

    /// Current freshness.
    pub fn freshness(&self) -> Freshness {
        self.state.freshness
    }

    /// The snapshot currently held, if any.
    pub fn snapshot(&self) -> Option<Arc<FieldSnapshot>> {
        self.state.snapshot.clone()
    }
}

// ── FieldWindow ────────────────────────────────────────────────────

/// Outcome of one [`FieldWindow::rotate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rotation {
    /// Time index of the snapshot now in `current`.
    pub promoted: TimeIndex,
    /// `true` if the future slot had not been refreshed since the last
    /// rotation, so `current` repeats the previous snapshot.
    pub stale: bool,
}

/// The resident `prev`/`current`/`future` triple.
#[derive(Debug)]
pub struct FieldWindow {
    params: PrepareParams,
    prev: Option<Arc<FieldSnapshot>>,
    current: Option<Arc<FieldSnapshot>>,
    future: Arc<FutureSlot>,
    rotations: u64,
}

impl FieldWindow {
    /// An unprimed window that prepares snapshots with `params`.
    pub fn new(params: PrepareParams) -> Self {
        Self {
            params,
            prev: None,
            current: None,
            future: Arc::new(FutureSlot::new()),
            rotations: 0,
        }
    }

    /// Preparation parameters (extent, display strides and scale).
    pub fn params(&self) -> &PrepareParams {
        &self.params
    }

    /// Normalise `raw` into a snapshot using this window's parameters.
    pub fn prepare(
        &self,
        raw: &RawSlice,
        time: TimeIndex,
        frame: usize,
    ) -> Result<FieldSnapshot, FieldError> {
        prepare(raw, &self.params, time, frame)
    }

    /// Fill `prev` and `current` synchronously at startup.
    ///
    /// With one snapshot, both roles share it. The future slot is seeded
    /// with `current`, marked stale, until the loader fills it.
    pub fn prime(
        &mut self,
        first: FieldSnapshot,
        second: Option<FieldSnapshot>,
    ) -> Result<(), FieldError> {
        let dims = first.dims();
        if let Some(s) = &second {
            if s.dims() != dims {
                return Err(FieldError::DimensionMismatch {
                    expected: dims,
                    found: s.dims(),
                });
            }
        }
        let first = Arc::new(first);
        let second = second.map(Arc::new).unwrap_or_else(|| Arc::clone(&first));

        let mut guard = self.future.lock();
        guard.state.dims = Some(dims);
        guard.state.snapshot = Some(Arc::clone(&second));
        guard.state.freshness = Freshness::Stale;
        drop(guard);

        debug!(prev = %first.time(), current = %second.time(), %dims, "field window primed");
        self.prev = Some(first);
        self.current = Some(second);
        Ok(())
    }

    /// The future slot, shared with the loader.
    pub fn future_slot(&self) -> &Arc<FutureSlot> {
        &self.future
    }

    /// `true` once `prev` and `current` are populated.
    pub fn is_ready(&self) -> bool {
        self.prev.is_some() && self.current.is_some()
    }

    /// Extents shared by the resident snapshots.
    pub fn dims(&self) -> Option<GridDims> {
        self.current.as_ref().map(|s| s.dims())
    }

    /// The `prev` snapshot.
    pub fn prev(&self) -> Option<&Arc<FieldSnapshot>> {
        self.prev.as_ref()
    }

    /// The `current` snapshot.
    pub fn current(&self) -> Option<&Arc<FieldSnapshot>> {
        self.current.as_ref()
    }

    /// The snapshot held by the future slot.
    pub fn future(&self) -> Option<Arc<FieldSnapshot>> {
        self.future.snapshot()
    }

    /// Time indices of `(prev, current, future)`.
    pub fn time_indices(&self) -> (Option<TimeIndex>, Option<TimeIndex>, Option<TimeIndex>) {
        (
            self.prev.as_ref().map(|s| s.time()),
            self.current.as_ref().map(|s| s.time()),
            self.future().map(|s| s.time()),
        )
    }

    /// Number of rotations performed.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Rotate roles: `prev <- current`, `current <- future`.
    ///
    /// # Panics
    ///
    /// Panics if the window has not been primed.
    pub fn rotate(&mut self) -> Rotation {
        let slot = Arc::clone(&self.future);
        let mut guard = slot.lock();
        self.rotate_locked(&mut guard)
    }

    /// Rotate while the caller already holds the future slot's lock, so
    /// that other work (waiting on a GPU fence, swapping GPU buffers)
    /// happens atomically with the rotation as seen by the loader.
    ///
    /// # Panics
    ///
    /// Panics if the window has not been primed, or if `guard` belongs
    /// to a different window's slot.
    pub fn rotate_locked(&mut self, guard: &mut FutureGuard<'_>) -> Rotation {
        assert!(
            std::ptr::eq(guard.slot, Arc::as_ptr(&self.future)),
            "rotate_locked() called with another window's future slot"
        );
        assert!(self.is_ready(), "rotate() on an unprimed field window");
        let incoming = match &guard.state.snapshot {
            Some(s) => Arc::clone(s),
            None => panic!("rotate() with a vacant future slot"),
        };
        let stale = guard.state.freshness != Freshness::Fresh;
        guard.state.freshness = Freshness::Stale;

        self.prev = self.current.take();
        self.current = Some(incoming);
        self.rotations += 1;

        let promoted = self.current.as_ref().map(|s| s.time()).unwrap_or_default();
        if stale {
            warn!(%promoted, "rotating onto a stale future; field frozen for one interval");
        } else {
            debug!(%promoted, rotation = self.rotations, "field window rotated");
        }
        Rotation { promoted, stale }
    }

    /// A sampler over `(prev, current)` at time fraction `t`.
    pub fn sampler(&self, t: f32) -> Result<WindowSampler, FieldError> {
        match (&self.prev, &self.current) {
            (Some(p), Some(c)) => Ok(WindowSampler::new(Arc::clone(p), Arc::clone(c), t)),
            _ => Err(FieldError::NotReady),
        }
    }

    /// Interpolated velocity at `pos` and time fraction `t`.
    pub fn sample(&self, pos: Vec3, t: f32) -> Result<Vec3, FieldError> {
        Ok(self.sampler(t)?.sample(pos))
    }

    /// Write the display subsample, interpolated between `prev` and
    /// `current` at fraction `t`, as an edge list into `out`.
    pub fn display_lines(&self, t: f32, out: &mut Vec<f32>) -> Result<(), FieldError> {
        let (prev, current) = match (&self.prev, &self.current) {
            (Some(p), Some(c)) => (p, c),
            _ => return Err(FieldError::NotReady),
        };
        let t = clamp_fraction(t);
        let scale = current.display_scale();
        out.clear();
        out.reserve(current.display_edges().len());
        let (pv, cv) = (prev.velocities(), current.velocities());
        for &node in current.display_nodes() {
            let i = node as usize;
            let start = current.node_position(i);
            let vel = pv[i].lerp(cv[i], t);
            push_edge(out, start, start + vel * scale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FLOATS_PER_EDGE;
    use advect_test_utils::frames;

    const DIMS: GridDims = GridDims {
        width: 6,
        height: 5,
        depth: 3,
    };

    fn snap(window: &FieldWindow, x: f32, t: u64) -> FieldSnapshot {
        window
            .prepare(&frames::uniform(DIMS, [x, 0.0, 0.0]), TimeIndex(t), t as usize)
            .unwrap()
    }

    fn primed() -> FieldWindow {
        let mut w = FieldWindow::new(PrepareParams::default());
        let a = snap(&w, 1.0, 0);
        let b = snap(&w, -1.0, 1);
        w.prime(a, Some(b)).unwrap();
        w
    }

    #[test]
    fn unprimed_window_is_not_ready() {
        let w = FieldWindow::new(PrepareParams::default());
        assert!(!w.is_ready());
        assert_eq!(w.sample(Vec3::ZERO, 0.0), Err(FieldError::NotReady));
        assert!(w.sampler(0.5).is_err());
    }

    #[test]
    #[should_panic(expected = "unprimed")]
    fn rotating_unprimed_window_panics() {
        FieldWindow::new(PrepareParams::default()).rotate();
    }

    #[test]
    fn single_frame_prime_shares_snapshot() {
        let mut w = FieldWindow::new(PrepareParams::default());
        let a = snap(&w, 1.0, 0);
        w.prime(a, None).unwrap();
        assert!(w.is_ready());
        assert!(Arc::ptr_eq(w.prev().unwrap(), w.current().unwrap()));
        assert_eq!(w.future_slot().freshness(), Freshness::Stale);
    }

    #[test]
    fn prime_rejects_mismatched_extents() {
        let mut w = FieldWindow::new(PrepareParams::default());
        let a = snap(&w, 1.0, 0);
        let b = w
            .prepare(
                &frames::uniform(GridDims::new(2, 2, 2), [1.0, 0.0, 0.0]),
                TimeIndex(1),
                1,
            )
            .unwrap();
        assert!(matches!(
            w.prime(a, Some(b)),
            Err(FieldError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rotate_promotes_fresh_future() {
        let mut w = primed();
        let c = Arc::new(snap(&w, 0.5, 2));
        w.future_slot().publish(Arc::clone(&c)).unwrap();

        let r = w.rotate();
        assert_eq!(r, Rotation { promoted: TimeIndex(2), stale: false });
        assert!(Arc::ptr_eq(w.current().unwrap(), &c));
        assert_eq!(w.prev().unwrap().time(), TimeIndex(1));
        assert_eq!(w.future_slot().freshness(), Freshness::Stale);
    }

    #[test]
    fn rotate_onto_stale_future_freezes_field() {
        let mut w = primed();
        let r = w.rotate();
        assert!(r.stale);
        assert_eq!(r.promoted, TimeIndex(1));
        let (p, c, _) = w.time_indices();
        assert_eq!(p, c);
    }

    #[test]
    fn publish_rejects_foreign_extents() {
        let w = primed();
        let odd = w
            .prepare(
                &frames::uniform(GridDims::new(2, 2, 2), [1.0, 0.0, 0.0]),
                TimeIndex(2),
                2,
            )
            .unwrap();
        assert!(w.future_slot().publish(Arc::new(odd)).is_err());
        assert_eq!(w.future_slot().freshness(), Freshness::Stale);
    }

    #[test]
    fn mark_stale_keeps_snapshot() {
        let w = primed();
        let c = Arc::new(snap(&w, 0.5, 2));
        w.future_slot().publish(Arc::clone(&c)).unwrap();
        w.future_slot().mark_stale();
        assert_eq!(w.future_slot().freshness(), Freshness::Stale);
        assert!(Arc::ptr_eq(&w.future().unwrap(), &c));
    }

    #[test]
    fn steady_state_time_indices_increase() {
        let mut w = primed();
        for t in 2..12u64 {
            let s = Arc::new(snap(&w, t as f32, t));
            w.future_slot().publish(s).unwrap();
            w.rotate();
            let next = Arc::new(snap(&w, 0.0, t + 1));
            w.future_slot().publish(next).unwrap();
            let (p, c, f) = w.time_indices();
            assert!(p.unwrap() < c.unwrap());
            assert!(c.unwrap() < f.unwrap());
            // Roll back the extra publish: the next iteration publishes t + 1.
            w.future_slot().mark_stale();
        }
    }

    #[test]
    fn sample_blends_prev_toward_current() {
        let w = primed();
        let p = Vec3::new(10.0, 10.0, 0.0);
        assert_eq!(w.sample(p, 0.0).unwrap().x, 1.0);
        assert!(w.sample(p, 0.5).unwrap().x.abs() < 1e-6);
        assert!((w.sample(p, 0.999_99).unwrap().x + 1.0).abs() < 1e-3);
    }

    #[test]
    fn display_lines_interpolate_and_scale() {
        let w = primed();
        let mut out = Vec::new();
        w.display_lines(0.0, &mut out).unwrap();
        let nodes = w.current().unwrap().display_nodes().len();
        assert_eq!(out.len(), nodes * FLOATS_PER_EDGE);
        // prev is +x at unit length, scaled by 10.
        assert!((out[3] - out[0] - 10.0).abs() < 1e-4);

        w.display_lines(0.5, &mut out).unwrap();
        assert!((out[3] - out[0]).abs() < 1e-4);
    }
}
