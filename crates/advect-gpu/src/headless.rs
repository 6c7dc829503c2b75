//! A software [`GpuDevice`].
//!
//! Buffers are plain `Vec<f32>`s. Uploads on the render context land
//! immediately. Uploads on the shared context are staged and attached
//! to the next fence created on that context; they land only when that
//! fence completes, which is what lets tests observe whether a consumer
//! waited. Fences complete in creation order, according to the
//! [`FenceMode`].

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::device::{BufferId, ComputeDispatch, ContextId, GpuDevice};
use crate::error::GpuError;
use crate::fence::{Fence, FenceStatus};

/// When headless fences complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceMode {
    /// As soon as they are created.
    Immediate,
    /// A fixed time after creation.
    Delayed(Duration),
    /// Only when [`HeadlessGpu::signal_all`] is called.
    Manual,
}

#[derive(Debug)]
struct PendingFence {
    id: u64,
    ready_at: Instant,
    writes: Vec<(BufferId, Vec<f32>)>,
    done: bool,
    destroyed: bool,
}

#[derive(Debug)]
struct State {
    mode: FenceMode,
    buffers: HashMap<BufferId, Vec<f32>>,
    next_buffer: u32,
    next_fence: u64,
    released: u64,
    staged: Vec<(BufferId, Vec<f32>)>,
    fences: Vec<PendingFence>,
    bound: HashMap<ContextId, ThreadId>,
    dispatches: Vec<ComputeDispatch>,
}

impl State {
    fn ensure_current(&self, context: ContextId) -> Result<(), GpuError> {
        match self.bound.get(&context) {
            Some(t) if *t == thread::current().id() => Ok(()),
            _ => Err(GpuError::ContextNotCurrent { context }),
        }
    }

    fn ensure_buffer(&self, buffer: BufferId) -> Result<(), GpuError> {
        if self.buffers.contains_key(&buffer) {
            Ok(())
        } else {
            Err(GpuError::UnknownBuffer { buffer })
        }
    }

    fn is_complete(&self, fence: &PendingFence, now: Instant) -> bool {
        match self.mode {
            FenceMode::Immediate => true,
            FenceMode::Delayed(_) => now >= fence.ready_at,
            FenceMode::Manual => fence.id <= self.released,
        }
    }

    /// Complete fences in order, applying their staged writes.
    fn poll(&mut self) {
        let now = Instant::now();
        let mut i = 0;
        while i < self.fences.len() {
            if !self.fences[i].done {
                if !self.is_complete(&self.fences[i], now) {
                    break;
                }
                let writes = std::mem::take(&mut self.fences[i].writes);
                for (buf, data) in writes {
                    self.buffers.insert(buf, data);
                }
                self.fences[i].done = true;
            }
            if self.fences[i].done && self.fences[i].destroyed {
                self.fences.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

/// In-process software GPU.
#[derive(Debug)]
pub struct HeadlessGpu {
    state: Mutex<State>,
    signalled: Condvar,
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new(FenceMode::Immediate)
    }
}

impl HeadlessGpu {
    /// A device whose fences complete according to `mode`.
    pub fn new(mode: FenceMode) -> Self {
        Self {
            state: Mutex::new(State {
                mode,
                buffers: HashMap::new(),
                next_buffer: 1,
                next_fence: 1,
                released: 0,
                staged: Vec::new(),
                fences: Vec::new(),
                bound: HashMap::new(),
                dispatches: Vec::new(),
            }),
            signalled: Condvar::new(),
        }
    }

    // Every mutation leaves the state consistent between statements, so
    // a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Complete every fence created so far (for [`FenceMode::Manual`]).
    pub fn signal_all(&self) {
        let mut s = self.lock();
        s.released = s.next_fence - 1;
        s.poll();
        drop(s);
        self.signalled.notify_all();
    }

    /// Contents of `buffer` as the GPU currently sees them.
    pub fn read_buffer(&self, buffer: BufferId) -> Option<Vec<f32>> {
        let mut s = self.lock();
        s.poll();
        s.buffers.get(&buffer).cloned()
    }

    /// Fences created but not yet completed.
    pub fn pending_fences(&self) -> usize {
        let mut s = self.lock();
        s.poll();
        s.fences.iter().filter(|f| !f.done).count()
    }

    /// Fence objects not yet destroyed.
    pub fn live_fences(&self) -> usize {
        self.lock().fences.iter().filter(|f| !f.destroyed).count()
    }

    /// Every compute dispatch issued so far.
    pub fn dispatches(&self) -> Vec<ComputeDispatch> {
        self.lock().dispatches.clone()
    }

    /// Thread currently holding `context`, if any.
    pub fn bound_thread(&self, context: ContextId) -> Option<ThreadId> {
        self.lock().bound.get(&context).copied()
    }
}

impl GpuDevice for HeadlessGpu {
    fn make_current(&self, context: ContextId) -> Result<(), GpuError> {
        let me = thread::current().id();
        let mut s = self.lock();
        match s.bound.get(&context) {
            Some(t) if *t != me => Err(GpuError::ContextInUse { context }),
            _ => {
                s.bound.insert(context, me);
                Ok(())
            }
        }
    }

    fn release_current(&self, context: ContextId) {
        let me = thread::current().id();
        let mut s = self.lock();
        if s.bound.get(&context) == Some(&me) {
            s.bound.remove(&context);
        }
    }

    fn create_buffer(&self, context: ContextId, len: usize) -> Result<BufferId, GpuError> {
        let mut s = self.lock();
        s.ensure_current(context)?;
        let id = BufferId(s.next_buffer);
        s.next_buffer += 1;
        s.buffers.insert(id, vec![0.0; len]);
        Ok(id)
    }

    fn upload(&self, context: ContextId, buffer: BufferId, data: &[f32]) -> Result<(), GpuError> {
        let mut s = self.lock();
        s.ensure_current(context)?;
        s.ensure_buffer(buffer)?;
        match context {
            ContextId::Render => {
                s.buffers.insert(buffer, data.to_vec());
            }
            ContextId::Shared => s.staged.push((buffer, data.to_vec())),
        }
        Ok(())
    }

    fn create_fence(&self, context: ContextId) -> Result<Fence, GpuError> {
        let mut s = self.lock();
        s.ensure_current(context)?;
        let id = s.next_fence;
        s.next_fence += 1;
        let delay = match s.mode {
            FenceMode::Delayed(d) => d,
            _ => Duration::ZERO,
        };
        let writes = if context == ContextId::Shared {
            std::mem::take(&mut s.staged)
        } else {
            Vec::new()
        };
        s.fences.push(PendingFence {
            id,
            ready_at: Instant::now() + delay,
            writes,
            done: false,
            destroyed: false,
        });
        s.poll();
        let id = NonZeroU64::new(id).ok_or_else(|| GpuError::DeviceLost {
            reason: "fence counter wrapped".into(),
        })?;
        Ok(Fence::from_raw(id))
    }

    fn flush(&self, context: ContextId) -> Result<(), GpuError> {
        let mut s = self.lock();
        s.ensure_current(context)?;
        s.poll();
        Ok(())
    }

    fn wait_fence(&self, fence: &Fence, timeout: Duration) -> FenceStatus {
        let id = fence.id().get();
        let deadline = Instant::now() + timeout;
        let mut s = self.lock();
        loop {
            s.poll();
            let entry = match s.fences.iter().find(|f| f.id == id) {
                Some(f) if !f.destroyed => f,
                _ => return FenceStatus::Error,
            };
            if entry.done {
                return FenceStatus::Signaled;
            }
            let now = Instant::now();
            if now >= deadline {
                return FenceStatus::Timeout;
            }
            let wake = match s.mode {
                FenceMode::Delayed(_) => entry.ready_at.min(deadline),
                _ => deadline,
            };
            let nap = wake.saturating_duration_since(now).max(Duration::from_micros(50));
            s = self
                .signalled
                .wait_timeout(s, nap)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn destroy_fence(&self, fence: Fence) {
        let id = fence.id().get();
        let mut s = self.lock();
        if let Some(f) = s.fences.iter_mut().find(|f| f.id == id) {
            f.destroyed = true;
        }
        s.poll();
    }

    fn dispatch(&self, context: ContextId, job: &ComputeDispatch) -> Result<(), GpuError> {
        let mut s = self.lock();
        s.ensure_current(context)?;
        for b in [job.prev, job.current, job.particles] {
            s.ensure_buffer(b)?;
        }
        s.dispatches.push(*job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ContextGuard;
    use std::sync::Arc;

    #[test]
    fn operations_need_a_current_context() {
        let gpu = HeadlessGpu::default();
        assert_eq!(
            gpu.create_buffer(ContextId::Render, 4),
            Err(GpuError::ContextNotCurrent {
                context: ContextId::Render
            })
        );
        let _g = ContextGuard::bind(&gpu, ContextId::Render).unwrap();
        assert!(gpu.create_buffer(ContextId::Render, 4).is_ok());
    }

    #[test]
    fn guard_releases_on_drop() {
        let gpu = HeadlessGpu::default();
        {
            let _g = ContextGuard::bind(&gpu, ContextId::Shared).unwrap();
            assert!(gpu.bound_thread(ContextId::Shared).is_some());
        }
        assert!(gpu.bound_thread(ContextId::Shared).is_none());
    }

    #[test]
    fn context_cannot_be_bound_on_two_threads() {
        let gpu = Arc::new(HeadlessGpu::default());
        let _g = ContextGuard::bind(gpu.as_ref(), ContextId::Shared).unwrap();
        let other = Arc::clone(&gpu);
        let res = thread::spawn(move || other.make_current(ContextId::Shared).err())
            .join()
            .unwrap();
        assert_eq!(
            res,
            Some(GpuError::ContextInUse {
                context: ContextId::Shared
            })
        );
    }

    #[test]
    fn shared_upload_lands_only_when_fence_signals() {
        let gpu = HeadlessGpu::new(FenceMode::Manual);
        let buf = {
            let _g = ContextGuard::bind(&gpu, ContextId::Render).unwrap();
            gpu.create_buffer(ContextId::Render, 2).unwrap()
        };
        let fence = {
            let _g = ContextGuard::bind(&gpu, ContextId::Shared).unwrap();
            gpu.upload(ContextId::Shared, buf, &[1.0, 2.0]).unwrap();
            let f = gpu.create_fence(ContextId::Shared).unwrap();
            gpu.flush(ContextId::Shared).unwrap();
            f
        };
        assert_eq!(gpu.read_buffer(buf), Some(vec![0.0, 0.0]));
        assert_eq!(
            gpu.wait_fence(&fence, Duration::from_millis(5)),
            FenceStatus::Timeout
        );
        gpu.signal_all();
        assert_eq!(gpu.wait_fence(&fence, Duration::ZERO), FenceStatus::Signaled);
        assert_eq!(gpu.read_buffer(buf), Some(vec![1.0, 2.0]));
        gpu.destroy_fence(fence);
        assert_eq!(gpu.live_fences(), 0);
    }

    #[test]
    fn delayed_fence_signals_after_delay() {
        let gpu = HeadlessGpu::new(FenceMode::Delayed(Duration::from_millis(20)));
        let fence = {
            let _g = ContextGuard::bind(&gpu, ContextId::Shared).unwrap();
            gpu.create_fence(ContextId::Shared).unwrap()
        };
        let start = Instant::now();
        assert_eq!(gpu.wait_fence(&fence, Duration::from_secs(2)), FenceStatus::Signaled);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn waiting_on_destroyed_fence_is_error() {
        let gpu = HeadlessGpu::default();
        let fence = {
            let _g = ContextGuard::bind(&gpu, ContextId::Render).unwrap();
            gpu.create_fence(ContextId::Render).unwrap()
        };
        let copy = Fence::from_raw(fence.id());
        gpu.destroy_fence(fence);
        assert_eq!(gpu.wait_fence(&copy, Duration::ZERO), FenceStatus::Error);
    }

    #[test]
    fn dispatch_is_recorded() {
        let gpu = HeadlessGpu::default();
        let _g = ContextGuard::bind(&gpu, ContextId::Render).unwrap();
        let a = gpu.create_buffer(ContextId::Render, 1).unwrap();
        let job = ComputeDispatch {
            prev: a,
            current: a,
            particles: a,
            particle_count: 0,
            time_fraction: 0.5,
            dt: 0.02,
        };
        gpu.dispatch(ContextId::Render, &job).unwrap();
        assert_eq!(gpu.dispatches(), vec![job]);
        let bad = ComputeDispatch {
            particles: BufferId(999),
            ..job
        };
        assert!(gpu.dispatch(ContextId::Render, &bad).is_err());
    }
}
