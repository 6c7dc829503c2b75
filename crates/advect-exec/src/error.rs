//! Task queue errors.

use std::error::Error;
use std::fmt;

/// Errors from [`TaskQueue`](crate::TaskQueue) construction and submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been shut down; no further tasks are accepted.
    ShutDown,
    /// A queue was requested with zero workers.
    NoWorkers,
    /// The OS refused to spawn a worker thread.
    SpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShutDown => write!(f, "task queue is shut down"),
            Self::NoWorkers => write!(f, "task queue needs at least one worker"),
            Self::SpawnFailed { reason } => write!(f, "failed to spawn worker: {reason}"),
        }
    }
}

impl Error for QueueError {}
