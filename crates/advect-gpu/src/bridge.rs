//! Three rotating field buffers on the device, in step with the CPU
//! [`FieldWindow`].
//!
//! Two threads touch the bridge. The loader calls
//! [`GpuBridge::preload`] on the shared context to fill the `future`
//! buffer and publish a fence. The render thread calls
//! [`GpuBridge::await_and_rotate`] to consume that fence before the
//! roles move, so the buffer that becomes `current` is never read while
//! its upload may still be in flight.
//!
//! A stale window rotation (no fresh `future` since the last one) is
//! mirrored by [`GpuBridge::await_and_freeze`] instead: roles stay put
//! and the `prev` buffer is overwritten with the `current` snapshot, so
//! the device pair repeats `current` just as the CPU pair does.
//!
//! [`GpuBridge::preload`] holds the role lock for the whole upload. A
//! rotation that falls due meanwhile blocks the render thread until that
//! upload has been issued, which bounds rotation latency by the upload
//! time of one snapshot.
//!
//! Lock order: a caller holding the window's future-slot lock may take
//! the role lock, never the reverse.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use advect_field::{FieldSnapshot, FieldWindow};
use tracing::{debug, error, trace, warn};

use crate::device::{BufferId, ComputeDispatch, ContextGuard, ContextId, GpuDevice};
use crate::error::GpuError;
use crate::fence::{FenceSlot, FenceStatus};

/// Which device buffer currently plays which role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldBuffers {
    /// Interpolation start.
    pub prev: BufferId,
    /// Interpolation end.
    pub current: BufferId,
    /// Target of the next preload.
    pub future: BufferId,
}

impl FieldBuffers {
    /// `prev <- current`, `current <- future`, `future <- prev`.
    fn rotate(&mut self) {
        *self = Self {
            prev: self.current,
            current: self.future,
            future: self.prev,
        };
    }
}

/// What [`GpuBridge::await_and_rotate`] found in the fence slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceWait {
    /// No preload had published a fence since the last rotation.
    NoFence,
    /// The preload completed within the bound.
    Signaled,
    /// The bound elapsed; the rotation went ahead anyway.
    Timeout,
    /// The device reported an error for the fence.
    Error,
}

/// Cumulative bridge counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Preloads issued.
    pub preloads: u64,
    /// Buffer rotations.
    pub rotations: u64,
    /// Fence waits that hit the bound.
    pub fence_timeouts: u64,
    /// Fence waits the device reported as failed.
    pub fence_errors: u64,
    /// Stale rotations mirrored by re-uploading `current` into `prev`.
    pub freezes: u64,
}

#[derive(Default)]
struct Counters {
    preloads: AtomicU64,
    rotations: AtomicU64,
    freezes: AtomicU64,
    fence_timeouts: AtomicU64,
    fence_errors: AtomicU64,
}

/// Device-side field window plus the particle buffer.
pub struct GpuBridge<D: GpuDevice> {
    device: Arc<D>,
    roles: Mutex<FieldBuffers>,
    particles: BufferId,
    fence_timeout: Duration,
    counters: Counters,
}

// Compile-time assertion: the bridge is shared with the loader thread.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<GpuBridge<crate::headless::HeadlessGpu>>();
};

impl<D: GpuDevice> GpuBridge<D> {
    /// Allocate the three field buffers and the particle buffer on the
    /// render context, and upload the window's resident snapshots.
    ///
    /// The render context must not be bound elsewhere.
    pub fn new(
        device: Arc<D>,
        window: &FieldWindow,
        particles: &[f32],
        fence_timeout: Duration,
    ) -> Result<Self, GpuError> {
        let (prev, current) = match (window.prev(), window.current()) {
            (Some(p), Some(c)) => (Arc::clone(p), Arc::clone(c)),
            _ => {
                return Err(GpuError::DeviceLost {
                    reason: "field window not primed".into(),
                })
            }
        };
        let future = window.future().unwrap_or_else(|| Arc::clone(&current));

        let ctx = ContextId::Render;
        let roles = {
            let _guard = ContextGuard::bind(device.as_ref(), ctx)?;
            let len = current.edges().len();
            let alloc = |snap: &FieldSnapshot| -> Result<BufferId, GpuError> {
                let id = device.create_buffer(ctx, len)?;
                device.upload(ctx, id, snap.edges())?;
                Ok(id)
            };
            FieldBuffers {
                prev: alloc(&prev)?,
                current: alloc(&current)?,
                future: alloc(&future)?,
            }
        };
        let particle_buf = {
            let _guard = ContextGuard::bind(device.as_ref(), ctx)?;
            let id = device.create_buffer(ctx, particles.len())?;
            device.upload(ctx, id, particles)?;
            id
        };
        debug!(?roles, particles = particle_buf.0, "gpu field buffers allocated");

        Ok(Self {
            device,
            roles: Mutex::new(roles),
            particles: particle_buf,
            fence_timeout,
            counters: Counters::default(),
        })
    }

    fn roles(&self) -> MutexGuard<'_, FieldBuffers> {
        self.roles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The device.
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Current role assignment.
    pub fn field_buffers(&self) -> FieldBuffers {
        *self.roles()
    }

    /// The particle buffer.
    pub fn particle_buffer(&self) -> BufferId {
        self.particles
    }

    /// Bound on each fence wait.
    pub fn fence_timeout(&self) -> Duration {
        self.fence_timeout
    }

    /// Upload `snapshot` into the `future` buffer on the shared context
    /// and publish a fence for it into `slot`.
    ///
    /// Called from the loader thread. The role lock is held across the
    /// upload so a concurrent rotation cannot retarget `future` midway;
    /// a rotation due meanwhile waits for the upload to be issued.
    pub fn preload(&self, snapshot: &FieldSnapshot, slot: &FenceSlot) -> Result<(), GpuError> {
        let ctx = ContextId::Shared;
        let _guard = ContextGuard::bind(self.device.as_ref(), ctx)?;
        let roles = self.roles();
        self.device.upload(ctx, roles.future, snapshot.edges())?;
        let fence = self.device.create_fence(ctx)?;
        self.device.flush(ctx)?;
        if let Some(displaced) = slot.publish(fence) {
            // The render thread skipped a rotation; the newer fence covers
            // the same buffer.
            self.device.destroy_fence(displaced);
        }
        drop(roles);
        self.counters.preloads.fetch_add(1, Ordering::Relaxed);
        trace!(time = %snapshot.time(), "future buffer preloaded");
        Ok(())
    }

    /// Consume the pending fence, waiting at most the configured bound,
    /// then rotate buffer roles.
    ///
    /// Called from the render thread. The rotation always happens; a
    /// timeout or device error is logged and counted.
    pub fn await_and_rotate(&self, slot: &FenceSlot) -> FenceWait {
        let outcome = self.consume_fence(slot);
        self.roles().rotate();
        self.counters.rotations.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Consume any pending fence, then keep the roles in place and
    /// overwrite the `prev` buffer with `current` from the render
    /// context.
    ///
    /// Called from the render thread instead of
    /// [`await_and_rotate`](Self::await_and_rotate) when the window
    /// rotates onto a stale future. The device pair then repeats
    /// `current` like the CPU pair, and the `future` buffer stays the
    /// target of the next preload.
    pub fn await_and_freeze(
        &self,
        slot: &FenceSlot,
        current: &FieldSnapshot,
    ) -> Result<FenceWait, GpuError> {
        let outcome = self.consume_fence(slot);
        let ctx = ContextId::Render;
        let _guard = ContextGuard::bind(self.device.as_ref(), ctx)?;
        let roles = self.roles();
        self.device.upload(ctx, roles.prev, current.edges())?;
        drop(roles);
        self.counters.freezes.fetch_add(1, Ordering::Relaxed);
        debug!(time = %current.time(), "gpu field frozen on current");
        Ok(outcome)
    }

    fn consume_fence(&self, slot: &FenceSlot) -> FenceWait {
        match slot.take() {
            None => FenceWait::NoFence,
            Some(fence) => {
                let start = Instant::now();
                let status = self.device.wait_fence(&fence, self.fence_timeout);
                self.device.destroy_fence(fence);
                match status {
                    FenceStatus::Signaled => {
                        trace!(waited_us = start.elapsed().as_micros() as u64, "fence signalled");
                        FenceWait::Signaled
                    }
                    FenceStatus::Timeout => {
                        self.counters.fence_timeouts.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            timeout_ms = self.fence_timeout.as_millis() as u64,
                            "preload fence wait timed out; rotating anyway"
                        );
                        FenceWait::Timeout
                    }
                    FenceStatus::Error => {
                        self.counters.fence_errors.fetch_add(1, Ordering::Relaxed);
                        error!("preload fence wait failed; rotating anyway");
                        FenceWait::Error
                    }
                }
            }
        }
    }

    /// Replace the particle buffer contents from the render context.
    pub fn upload_particles(&self, positions: &[f32]) -> Result<(), GpuError> {
        let ctx = ContextId::Render;
        let _guard = ContextGuard::bind(self.device.as_ref(), ctx)?;
        self.device.upload(ctx, self.particles, positions)
    }

    /// Dispatch the particle kernel over the `prev`/`current` buffers.
    pub fn dispatch_compute(
        &self,
        particle_count: usize,
        time_fraction: f32,
        dt: f32,
    ) -> Result<(), GpuError> {
        let ctx = ContextId::Render;
        let _guard = ContextGuard::bind(self.device.as_ref(), ctx)?;
        let roles = self.field_buffers();
        self.device.dispatch(
            ctx,
            &ComputeDispatch {
                prev: roles.prev,
                current: roles.current,
                particles: self.particles,
                particle_count,
                time_fraction,
                dt,
            },
        )
    }

    /// Counter snapshot.
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            preloads: self.counters.preloads.load(Ordering::Relaxed),
            rotations: self.counters.rotations.load(Ordering::Relaxed),
            fence_timeouts: self.counters.fence_timeouts.load(Ordering::Relaxed),
            fence_errors: self.counters.fence_errors.load(Ordering::Relaxed),
            freezes: self.counters.freezes.load(Ordering::Relaxed),
        }
    }
}

impl<D: GpuDevice> std::fmt::Debug for GpuBridge<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBridge")
            .field("roles", &self.field_buffers())
            .field("particles", &self.particles)
            .field("fence_timeout", &self.fence_timeout)
            .field("stats", &self.stats())
            .finish()
    }
}
