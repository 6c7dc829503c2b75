//! Fence values and the atomic slot they are handed over in.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// A GPU-side completion marker.
///
/// Owned, not `Clone`: exactly one party holds a fence at a time and is
/// responsible for passing it to
/// [`GpuDevice::destroy_fence`](crate::GpuDevice::destroy_fence).
#[derive(PartialEq, Eq)]
pub struct Fence {
    id: NonZeroU64,
}

impl Fence {
    /// Wrap a device-issued fence id.
    pub fn from_raw(id: NonZeroU64) -> Self {
        Self { id }
    }

    /// The device-issued id.
    pub fn id(&self) -> NonZeroU64 {
        self.id
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fence({})", self.id)
    }
}

/// Result of waiting on a fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU passed the fence.
    Signaled,
    /// The wait bound elapsed first.
    Timeout,
    /// The device could not wait (unknown or already destroyed fence).
    Error,
}

/// Single-fence hand-off cell between the loader and render threads.
///
/// Holds either nothing (raw 0) or one fence id. The producer publishes
/// with release ordering after the fenced upload has been issued and
/// flushed; the consumer takes with acquire ordering, so everything the
/// producer did before publishing is visible once the fence is seen.
#[derive(Default)]
pub struct FenceSlot {
    raw: AtomicU64,
}

// Compile-time assertion: FenceSlot is shared between threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<FenceSlot>();
};

impl FenceSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self {
            raw: AtomicU64::new(0),
        }
    }

    /// Store `fence`, returning any fence it displaced. The caller owns
    /// the displaced fence and must destroy it.
    pub fn publish(&self, fence: Fence) -> Option<Fence> {
        // AcqRel: release our writes to the consumer, and acquire the
        // displaced fence's provenance if we take ownership of it.
        let old = self.raw.swap(fence.id.get(), Ordering::AcqRel);
        NonZeroU64::new(old).map(Fence::from_raw)
    }

    /// Remove and return the stored fence, if any.
    pub fn take(&self) -> Option<Fence> {
        // Acquire pairs with the release in `publish`.
        let old = self.raw.swap(0, Ordering::Acquire);
        NonZeroU64::new(old).map(Fence::from_raw)
    }

    /// `true` if a fence is waiting to be taken.
    pub fn is_pending(&self) -> bool {
        self.raw.load(Ordering::Acquire) != 0
    }
}

impl fmt::Debug for FenceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceSlot")
            .field("raw", &self.raw.load(Ordering::Relaxed))
            .finish()
    }
}
