//! GPU collaborator errors.

use std::error::Error;
use std::fmt;

use crate::device::{BufferId, ContextId};

/// Errors reported by a [`GpuDevice`](crate::GpuDevice).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GpuError {
    /// The context is bound on another thread.
    ContextInUse {
        /// The contested context.
        context: ContextId,
    },
    /// An operation was issued on a context not bound to this thread.
    ContextNotCurrent {
        /// The context the operation targeted.
        context: ContextId,
    },
    /// The buffer handle is not known to the device.
    UnknownBuffer {
        /// The unknown handle.
        buffer: BufferId,
    },
    /// The device can no longer accept work.
    DeviceLost {
        /// Device-specific reason.
        reason: String,
    },
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContextInUse { context } => {
                write!(f, "{context:?} context is bound on another thread")
            }
            Self::ContextNotCurrent { context } => {
                write!(f, "{context:?} context is not current on this thread")
            }
            Self::UnknownBuffer { buffer } => write!(f, "unknown buffer {}", buffer.0),
            Self::DeviceLost { reason } => write!(f, "device lost: {reason}"),
        }
    }
}

impl Error for GpuError {}
