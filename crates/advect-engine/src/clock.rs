//! Time-step bookkeeping.
//!
//! [`FrameClock`] accumulates per-frame time into a counter bounded by
//! the fixed time-step and reports when a rotation is due.
//! [`FrameSchedule`] walks the source frames cyclically.

use advect_core::{SourceHandles, TimeIndex};

// ── FrameClock ─────────────────────────────────────────────────────

/// Accumulator of simulation time within the current time-step.
///
/// The counter lives in `[0, time_step)`. Crossing the bound resets it
/// to zero rather than carrying the remainder over, so one rotation
/// happens per crossing no matter how large the frame's `dt` was.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameClock {
    time_step: f32,
    in_step: f32,
    steps: u64,
}

impl FrameClock {
    /// A clock at the start of a step of length `time_step`.
    ///
    /// # Panics
    ///
    /// Panics if `time_step` is not finite and positive.
    pub fn new(time_step: f32) -> Self {
        assert!(
            time_step.is_finite() && time_step > 0.0,
            "time_step must be finite and positive, got {time_step}"
        );
        Self {
            time_step,
            in_step: 0.0,
            steps: 0,
        }
    }

    /// Add `dt`. Returns `true` if the step boundary was crossed, in
    /// which case the counter has been reset.
    pub fn advance(&mut self, dt: f32) -> bool {
        if dt.is_finite() && dt > 0.0 {
            self.in_step += dt;
        }
        if self.in_step >= self.time_step {
            self.in_step = 0.0;
            self.steps += 1;
            true
        } else {
            false
        }
    }

    /// Position within the current step, in `[0, 1)`.
    pub fn time_fraction(&self) -> f32 {
        (self.in_step / self.time_step).clamp(0.0, 1.0 - f32::EPSILON)
    }

    /// Time accumulated in the current step.
    pub fn in_step(&self) -> f32 {
        self.in_step
    }

    /// Length of one step.
    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// Step boundaries crossed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

// ── FrameSchedule ──────────────────────────────────────────────────

/// Cyclic playback order of the source frames.
///
/// Time indices keep increasing across wrap-around, so the window's
/// snapshots stay ordered even when frame numbers repeat.
#[derive(Clone, Debug)]
pub struct FrameSchedule {
    frames: Vec<SourceHandles>,
    next_frame: usize,
    next_time: TimeIndex,
}

impl FrameSchedule {
    /// A schedule over `frames`, starting at frame 0.
    ///
    /// # Panics
    ///
    /// Panics if `frames` is empty.
    pub fn new(frames: Vec<SourceHandles>) -> Self {
        assert!(!frames.is_empty(), "a frame schedule needs at least one frame");
        Self {
            frames,
            next_frame: 0,
            next_time: TimeIndex(0),
        }
    }

    /// Number of distinct source frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; a schedule holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sources of `frame`.
    pub fn handles(&self, frame: usize) -> &SourceHandles {
        &self.frames[frame % self.frames.len()]
    }

    /// The frame [`advance`](Self::advance) would return next.
    pub fn peek(&self) -> (usize, TimeIndex) {
        (self.next_frame, self.next_time)
    }

    /// Consume the next frame: its number and time index.
    pub fn advance(&mut self) -> (usize, TimeIndex) {
        let out = self.peek();
        self.next_frame = (self.next_frame + 1) % self.frames.len();
        self.next_time = self.next_time.next();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rotation_due_once_per_step() {
        let mut c = FrameClock::new(1.0);
        let due: Vec<bool> = (0..10).map(|_| c.advance(0.25)).collect();
        assert_eq!(due.iter().filter(|d| **d).count(), 2);
        assert!(due[3] && due[7]);
        assert_eq!(c.steps(), 2);
    }

    #[test]
    fn boundary_resets_to_zero() {
        let mut c = FrameClock::new(1.0);
        assert!(c.advance(1.75));
        assert_eq!(c.in_step(), 0.0);
        assert_eq!(c.time_fraction(), 0.0);
    }

    #[test]
    fn invalid_dt_is_ignored() {
        let mut c = FrameClock::new(1.0);
        c.advance(0.5);
        assert!(!c.advance(f32::NAN));
        assert!(!c.advance(-3.0));
        assert_eq!(c.in_step(), 0.5);
    }

    #[test]
    #[should_panic(expected = "time_step")]
    fn zero_step_panics() {
        let _ = FrameClock::new(0.0);
    }

    #[test]
    fn schedule_wraps_with_increasing_time() {
        let mut s = FrameSchedule::new(advect_test_utils::frames::handles(3));
        let seen: Vec<_> = (0..5).map(|_| s.advance()).collect();
        let frames: Vec<usize> = seen.iter().map(|(f, _)| *f).collect();
        assert_eq!(frames, vec![0, 1, 2, 0, 1]);
        assert!(seen.windows(2).all(|w| w[0].1 < w[1].1));
        assert_eq!(s.handles(4), s.handles(1));
    }

    proptest! {
        #[test]
        fn fraction_stays_in_unit_interval(
            step in 0.1f32..100.0,
            dts in prop::collection::vec(0.0f32..50.0, 1..50),
        ) {
            let mut c = FrameClock::new(step);
            for dt in dts {
                c.advance(dt);
                let t = c.time_fraction();
                prop_assert!((0.0..1.0).contains(&t));
                prop_assert!(c.in_step() < step);
            }
        }
    }
}
