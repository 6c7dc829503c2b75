//! Per-frame performance metrics.
//!
//! [`FrameMetrics`] captures timing for the most recent frame together
//! with cumulative streaming counters, for telemetry and tests.

/// Timing and counters collected during a single frame.
///
/// Durations are in microseconds and describe the most recent
/// [`Simulation::frame`](crate::Simulation::frame) call. Counters are
/// cumulative since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameMetrics {
    /// Wall-clock time for the entire frame.
    pub total_us: u64,
    /// Time spent rotating, including the fence wait. Zero on frames
    /// without a rotation.
    pub rotate_us: u64,
    /// Time spent waiting on the preload fence.
    pub fence_wait_us: u64,
    /// Time spent advancing particles (or issuing the compute dispatch).
    pub integrate_us: u64,
    /// Time spent uploading particle positions.
    pub upload_us: u64,
    /// Time spent building the display lines.
    pub display_us: u64,
    /// Cumulative number of frames run.
    pub frames: u64,
    /// Cumulative number of rotations.
    pub rotations: u64,
    /// Cumulative number of rotations onto a stale future.
    pub stale_rotations: u64,
    /// Cumulative number of rotations that found a load still in flight
    /// and carried it over.
    pub carried_loads: u64,
    /// Cumulative number of fence waits that timed out.
    pub fence_timeouts: u64,
    /// Cumulative number of fence waits the device reported as failed.
    pub fence_errors: u64,
    /// Cumulative number of loads that published a snapshot.
    pub loads_completed: u64,
    /// Cumulative number of loads that left the slot stale.
    pub loads_failed: u64,
    /// Cumulative number of enqueues rejected while a load was in flight.
    pub loads_rejected: u64,
}
