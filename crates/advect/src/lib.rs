//! Advect: streaming particle advection through time-varying 3-D
//! velocity fields.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all advect sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use advect::prelude::*;
//! use advect_test_utils::MemoryReader;
//!
//! let (reader, frames) = MemoryReader::tagged_series(GridDims::new(8, 8, 4), 3);
//! let config = SimConfig {
//!     time_step: 1.0,
//!     particle_count: 100,
//!     fineness_xy: 2,
//!     fineness_z: 1,
//!     worker_count: Some(2),
//!     ..SimConfig::default()
//! };
//! let mut sim = Simulation::builder(Arc::new(reader), Arc::new(HeadlessGpu::default()), frames)
//!     .config(config)
//!     .build()
//!     .unwrap();
//!
//! // Let the background load of frame 2 land, then cross a step boundary.
//! sim.wait_for_load(Duration::from_secs(5));
//! let out = sim.frame(1.0).unwrap();
//! assert_eq!(out.positions.len(), 100 * 3);
//! assert_eq!(out.rotation.unwrap().promoted, TimeIndex(2));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `advect-core` | Geometry, IDs, errors, collaborator traits |
//! | [`exec`] | `advect-exec` | The FIFO task queue |
//! | [`field`] | `advect-field` | Snapshots, the field window, the grid container |
//! | [`physics`] | `advect-physics` | Physics models and the particle integrator |
//! | [`gpu`] | `advect-gpu` | Device trait, fences, buffer rotation |
//! | [`engine`] | `advect-engine` | Configuration, loader, the simulation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Geometry, IDs, errors and collaborator traits (`advect-core`).
pub use advect_core as types;

/// The FIFO task queue (`advect-exec`).
pub use advect_exec as exec;

/// Field snapshots, the triple-buffered window, and the binary grid
/// container (`advect-field`).
pub use advect_field as field;

/// Particle state, physics models, and the integrator
/// (`advect-physics`).
pub use advect_physics as physics;

/// GPU device trait, fences, and the buffer bridge (`advect-gpu`).
pub use advect_gpu as gpu;

/// Configuration, the field loader, and the simulation (`advect-engine`).
pub use advect_engine as engine;

/// Common imports.
///
/// ```rust
/// use advect::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use advect_core::{
        DomainExtent, GridDims, SourceHandle, SourceHandles, StorageReader, TimeIndex, Vec3,
        VelocitySampler,
    };

    // Field
    pub use advect_field::{FieldSnapshot, FieldWindow, GridFileReader, PrepareParams};

    // Physics
    pub use advect_physics::{BoundaryPolicy, ModelKind, ParticleState, SeedPattern};

    // GPU
    pub use advect_gpu::{GpuDevice, HeadlessGpu};

    // Engine
    pub use advect_engine::{
        ExecutionMode, FrameMetrics, FrameOutput, Seeding, SimConfig, SimError, Simulation,
    };
}
