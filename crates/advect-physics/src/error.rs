//! Physics and integrator errors.

use std::error::Error;
use std::fmt;

use advect_exec::QueueError;

/// A physics constant rejected by
/// [`PhysicsParams::validate`](crate::PhysicsParams::validate).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamError {
    /// A constant is NaN or infinite.
    NonFinite {
        /// Name of the constant.
        param: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// The particle mass is zero or negative.
    NonPositiveMass {
        /// The rejected value.
        value: f32,
    },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { param, value } => write!(f, "{param} must be finite, got {value}"),
            Self::NonPositiveMass { value } => write!(f, "mass must be > 0, got {value}"),
        }
    }
}

impl Error for ParamError {}

/// Errors from [`ParticleIntegrator`](crate::ParticleIntegrator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepError {
    /// The worker pool could not be created or has shut down.
    Queue(QueueError),
    /// A chunk task panicked. Its particles hold whatever state the
    /// task reached before panicking.
    WorkerLost {
        /// Index of the chunk.
        chunk: usize,
    },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(e) => write!(f, "worker pool: {e}"),
            Self::WorkerLost { chunk } => write!(f, "chunk {chunk} task panicked"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Queue(e) => Some(e),
            _ => None,
        }
    }
}

impl From<QueueError> for StepError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}
