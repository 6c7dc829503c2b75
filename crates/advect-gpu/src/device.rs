//! The GPU collaborator interface.

use std::time::Duration;

use crate::error::GpuError;
use crate::fence::{Fence, FenceStatus};

/// Handle of a device storage buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// The two graphics contexts in play.
///
/// `Render` belongs to the orchestrating thread. `Shared` shares objects
/// with it and is bound by the loader thread around its uploads. Each
/// must be bound to at most one thread at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// Primary context used for drawing and compute dispatch.
    Render,
    /// Secondary context used by the loader for preloads.
    Shared,
}

/// Inputs of one particle compute dispatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComputeDispatch {
    /// Field buffer at fraction 0.
    pub prev: BufferId,
    /// Field buffer approached as the fraction nears 1.
    pub current: BufferId,
    /// Particle buffer, read and written in place.
    pub particles: BufferId,
    /// Number of particles.
    pub particle_count: usize,
    /// Time fraction between `prev` and `current`.
    pub time_fraction: f32,
    /// Integration step.
    pub dt: f32,
}

/// Operations the streaming core needs from a graphics device.
///
/// Uploads are synchronous from the calling thread's point of view and
/// asynchronous from the GPU's: data uploaded on one context is only
/// guaranteed visible to another after a fence inserted behind it has
/// signalled.
pub trait GpuDevice: Send + Sync + 'static {
    /// Bind `context` to the calling thread.
    fn make_current(&self, context: ContextId) -> Result<(), GpuError>;

    /// Unbind `context` from the calling thread. A no-op if it is not
    /// bound here.
    fn release_current(&self, context: ContextId);

    /// Allocate a buffer of `len` floats.
    fn create_buffer(&self, context: ContextId, len: usize) -> Result<BufferId, GpuError>;

    /// Replace the contents of `buffer` with `data`.
    fn upload(&self, context: ContextId, buffer: BufferId, data: &[f32]) -> Result<(), GpuError>;

    /// Insert a fence behind all work issued so far on `context`.
    fn create_fence(&self, context: ContextId) -> Result<Fence, GpuError>;

    /// Submit queued work on `context` to the GPU.
    fn flush(&self, context: ContextId) -> Result<(), GpuError>;

    /// Block until `fence` signals or `timeout` elapses.
    fn wait_fence(&self, fence: &Fence, timeout: Duration) -> FenceStatus;

    /// Release the fence object.
    fn destroy_fence(&self, fence: Fence);

    /// Run the particle compute kernel.
    fn dispatch(&self, context: ContextId, job: &ComputeDispatch) -> Result<(), GpuError>;
}

/// RAII binding of a context to the current thread.
///
/// Releases the context when dropped, on every exit path.
#[must_use = "the context is released as soon as the guard is dropped"]
pub struct ContextGuard<'a, D: GpuDevice + ?Sized> {
    device: &'a D,
    context: ContextId,
}

impl<'a, D: GpuDevice + ?Sized> ContextGuard<'a, D> {
    /// Bind `context` on the calling thread.
    pub fn bind(device: &'a D, context: ContextId) -> Result<Self, GpuError> {
        device.make_current(context)?;
        Ok(Self { device, context })
    }

    /// The bound context.
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl<D: GpuDevice + ?Sized> Drop for ContextGuard<'_, D> {
    fn drop(&mut self) {
        self.device.release_current(self.context);
    }
}
