//! GPU-side field storage and the fence hand-off between the loader's
//! shared context and the render context.
//!
//! The graphics API itself is a collaborator behind [`GpuDevice`].
//! [`GpuBridge`] keeps three field buffers in the roles
//! `prev`/`current`/`future`, rotates them in step with the CPU window,
//! and exchanges one [`Fence`] per preload through a [`FenceSlot`].
//! [`HeadlessGpu`] is a software device for tests and headless runs.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod device;
pub mod error;
pub mod fence;
pub mod headless;

pub use bridge::{BridgeStats, FenceWait, FieldBuffers, GpuBridge};
pub use device::{BufferId, ComputeDispatch, ContextGuard, ContextId, GpuDevice};
pub use error::GpuError;
pub use fence::{Fence, FenceSlot, FenceStatus};
pub use headless::{FenceMode, HeadlessGpu};
