//! Streaming particle advection engine.
//!
//! Ties the field window, the background loader, the particle
//! integrator and the GPU bridge together behind one owning
//! [`Simulation`], driven once per display frame:
//!
//! ```text
//! frame(dt)
//!   FrameClock::advance ── boundary? ── await fence, rotate GPU + CPU,
//!   │                                   enqueue next FieldLoader job
//!   ParticleIntegrator step over (prev, current) at the time fraction
//!   GpuBridge::upload_particles
//!   FieldWindow::display_lines
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod simulation;

pub use clock::{FrameClock, FrameSchedule};
pub use config::{ConfigError, ExecutionMode, Seeding, SimConfig};
pub use error::SimError;
pub use loader::{FieldLoader, LoadError, LoadFailure, LoadOutcome, LoaderStats, PendingLoad};
pub use metrics::FrameMetrics;
pub use simulation::{
    FrameOutput, RotationReport, ShutdownReport, Simulation, SimulationBuilder,
};
