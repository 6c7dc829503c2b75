//! Particle state, physics models, and the particle integrator.
//!
//! Particles are advanced through a [`VelocitySampler`] by one of the
//! [`PhysicsModel`] strategies:
//!
//! - [`Advection`]: RK4 on `dx/dt = v_field(x)`; particles carry no
//!   inertia.
//! - [`Drag`]: RK4 on `(x, v)` with a linear drag toward the fluid
//!   velocity.
//! - [`FullForce`]: RK4 on `(x, v)` with drag, centripetal, buoyant,
//!   gravitational and added-mass terms.
//!
//! The [`ParticleIntegrator`] owns the particle array, partitioned into
//! static chunks that are advanced on a fork-join
//! [`TaskQueue`](advect_exec::TaskQueue) pool or sequentially in place.
//!
//! [`VelocitySampler`]: advect_core::VelocitySampler

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bounds;
pub mod error;
pub mod integrator;
pub mod model;
pub mod rk4;
pub mod seed;
pub mod state;

pub use bounds::BoundaryPolicy;
pub use error::{ParamError, StepError};
pub use integrator::{IntegratorConfig, ParticleIntegrator, StepStats};
pub use model::{
    Advection, Drag, ForceTerms, FullForce, ModelKind, PhysicsModel, PhysicsParams,
};
pub use seed::{seed_from_geo, seed_particles, SeedPattern};
pub use state::ParticleState;
