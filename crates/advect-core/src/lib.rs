//! Core types and traits for the advect particle streamer.
//!
//! This is the leaf crate of the workspace. It defines the geometry of
//! the simulation domain, the identifiers that order field time-steps,
//! error types, and the collaborator traits through which the streaming
//! core reads gridded velocity data and particle seed positions.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod geometry;
pub mod id;
pub mod storage;
pub mod traits;

pub use error::{FieldError, StorageError};
pub use geometry::{DomainExtent, GridDims};
pub use glam::Vec3;
pub use id::TimeIndex;
pub use storage::{GeoPositions, RawSlice, SourceHandle, SourceHandles, VariableNames};
pub use traits::{PositionReader, StorageReader, VelocitySampler};
