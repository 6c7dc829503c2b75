//! Top-level simulation error.

use std::error::Error;
use std::fmt;

use advect_core::{FieldError, StorageError};
use advect_exec::QueueError;
use advect_gpu::GpuError;
use advect_physics::StepError;

use crate::config::ConfigError;
use crate::loader::LoadError;

/// Errors surfaced by [`Simulation`](crate::Simulation) construction and
/// its frame loop.
///
/// Storage failures of background loads are not among them: those are
/// logged and leave the field stale for one interval.
#[derive(Debug)]
pub enum SimError {
    /// Configuration rejected.
    Config(ConfigError),
    /// A startup frame could not be read.
    Storage(StorageError),
    /// A startup frame could not be prepared, or the window was not
    /// ready for sampling.
    Field(FieldError),
    /// An executor could not be created or refused work.
    Queue(QueueError),
    /// The particle step failed.
    Step(StepError),
    /// The GPU device failed.
    Gpu(GpuError),
    /// The next load could not be enqueued.
    Load(LoadError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Field(e) => write!(f, "field: {e}"),
            Self::Queue(e) => write!(f, "queue: {e}"),
            Self::Step(e) => write!(f, "step: {e}"),
            Self::Gpu(e) => write!(f, "gpu: {e}"),
            Self::Load(e) => write!(f, "load: {e}"),
        }
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Field(e) => Some(e),
            Self::Queue(e) => Some(e),
            Self::Step(e) => Some(e),
            Self::Gpu(e) => Some(e),
            Self::Load(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StorageError> for SimError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<FieldError> for SimError {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl From<QueueError> for SimError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

impl From<StepError> for SimError {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

impl From<GpuError> for SimError {
    fn from(e: GpuError) -> Self {
        Self::Gpu(e)
    }
}

impl From<LoadError> for SimError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}
