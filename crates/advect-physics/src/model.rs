//! Physics model strategies.
//!
//! A model supplies the particle acceleration for a given state and the
//! fluid velocity at the particle. [`PhysicsModel::advance`] integrates
//! it with RK4 on `(position, velocity)`; [`Advection`] overrides the
//! step to integrate position only.

use std::fmt;
use std::sync::Arc;

use advect_core::{VelocitySampler, Vec3};

use crate::error::ParamError;
use crate::rk4;
use crate::state::ParticleState;

/// Per-component magnitude below which velocity or acceleration counts
/// as zero for the centripetal term.
const DEGENERATE: f32 = 1e-4;

/// `|v × a|` below which the curvature radius is undefined.
const CROSS_EPSILON: f32 = 1e-6;

/// A particle physics model.
pub trait PhysicsModel: Send + Sync + fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Acceleration of a particle in `state` immersed in fluid moving at
    /// `field_velocity`.
    fn acceleration(&self, state: &ParticleState, field_velocity: Vec3) -> Vec3;

    /// Advance `particle` by `dt` through `field`.
    fn advance(&self, field: &dyn VelocitySampler, particle: &mut ParticleState, dt: f32) {
        rk4::force_step(self, field, particle, dt);
    }
}

// ── Parameters ─────────────────────────────────────────────────────

/// Which terms [`FullForce`] includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForceTerms {
    /// Linear drag toward the fluid velocity.
    pub drag: bool,
    /// Centripetal force from path curvature.
    pub centripetal: bool,
    /// Buoyancy, `+z`.
    pub buoyancy: bool,
    /// Gravity, `-z`.
    pub gravity: bool,
    /// Added-mass reaction to acceleration.
    pub added_mass: bool,
}

impl Default for ForceTerms {
    fn default() -> Self {
        Self {
            drag: true,
            centripetal: true,
            buoyancy: true,
            gravity: true,
            added_mass: true,
        }
    }
}

/// Physical constants shared by the inertial models.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsParams {
    /// Drag coefficient `b`. Default: 50.
    pub drag: f32,
    /// Particle mass `m`. Default: 1.
    pub mass: f32,
    /// Fluid density `rho`. Default: 1.
    pub fluid_density: f32,
    /// Particle volume `V`. Default: 1.
    pub volume: f32,
    /// Gravitational acceleration `g`. Default: 9.81.
    pub gravity: f32,
    /// Added-mass coefficient `C`. Default: 0.5.
    pub added_mass: f32,
    /// Enabled force terms.
    pub terms: ForceTerms,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            drag: 50.0,
            mass: 1.0,
            fluid_density: 1.0,
            volume: 1.0,
            gravity: 9.81,
            added_mass: 0.5,
            terms: ForceTerms::default(),
        }
    }
}

impl PhysicsParams {
    /// Check that every constant is finite and the mass is positive.
    pub fn validate(&self) -> Result<(), ParamError> {
        let named = [
            ("drag", self.drag),
            ("mass", self.mass),
            ("fluid_density", self.fluid_density),
            ("volume", self.volume),
            ("gravity", self.gravity),
            ("added_mass", self.added_mass),
        ];
        for (name, v) in named {
            if !v.is_finite() {
                return Err(ParamError::NonFinite {
                    param: name,
                    value: v,
                });
            }
        }
        if self.mass <= 0.0 {
            return Err(ParamError::NonPositiveMass { value: self.mass });
        }
        Ok(())
    }
}

// ── Models ─────────────────────────────────────────────────────────

/// Pure advection: particles move with the fluid.
#[derive(Clone, Copy, Debug, Default)]
pub struct Advection;

impl PhysicsModel for Advection {
    fn name(&self) -> &'static str {
        "advection"
    }

    fn acceleration(&self, _state: &ParticleState, _field_velocity: Vec3) -> Vec3 {
        Vec3::ZERO
    }

    fn advance(&self, field: &dyn VelocitySampler, particle: &mut ParticleState, dt: f32) {
        rk4::advect_step(field, particle, dt);
    }
}

/// Linear drag only: `a = -(b / m) (v - v_field)`.
#[derive(Clone, Copy, Debug)]
pub struct Drag {
    params: PhysicsParams,
}

impl Drag {
    /// Drag model with the given constants.
    pub fn new(params: PhysicsParams) -> Self {
        Self { params }
    }
}

impl PhysicsModel for Drag {
    fn name(&self) -> &'static str {
        "simple-drag"
    }

    fn acceleration(&self, state: &ParticleState, field_velocity: Vec3) -> Vec3 {
        -(self.params.drag / self.params.mass) * (state.velocity - field_velocity)
    }
}

/// Drag, centripetal, buoyant, gravitational and added-mass forces.
#[derive(Clone, Copy, Debug)]
pub struct FullForce {
    params: PhysicsParams,
}

impl FullForce {
    /// Full force model with the given constants and enabled terms.
    pub fn new(params: PhysicsParams) -> Self {
        Self { params }
    }

    /// Centripetal force `m |v|² / R` along `â`, with curvature radius
    /// `R = |v|³ / |v × a|`. Zero when velocity or acceleration is
    /// negligible, or when `|v × a|` is.
    pub fn centripetal(&self, velocity: Vec3, acceleration: Vec3) -> Vec3 {
        let negligible = |v: Vec3| v.abs().max_element() < DEGENERATE;
        if negligible(velocity) || negligible(acceleration) {
            return Vec3::ZERO;
        }
        let cross = velocity.cross(acceleration).length();
        if cross < CROSS_EPSILON {
            return Vec3::ZERO;
        }
        let speed = velocity.length();
        let radius = speed * speed * speed / cross;
        self.params.mass * velocity.length_squared() / radius * acceleration.normalize()
    }
}

impl PhysicsModel for FullForce {
    fn name(&self) -> &'static str {
        "full-force"
    }

    fn acceleration(&self, state: &ParticleState, field_velocity: Vec3) -> Vec3 {
        let p = &self.params;
        let t = &p.terms;
        let mut force = Vec3::ZERO;
        if t.drag {
            force += -p.drag * (state.velocity - field_velocity);
        }
        if t.centripetal {
            force += self.centripetal(state.velocity, state.acceleration);
        }
        if t.buoyancy {
            force += p.fluid_density * p.volume * p.gravity * Vec3::Z;
        }
        if t.gravity {
            force += p.mass * p.gravity * Vec3::NEG_Z;
        }
        if t.added_mass {
            force += -p.added_mass * p.fluid_density * p.volume * state.acceleration;
        }
        force / p.mass
    }
}

/// Configuration-level model selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModelKind {
    /// [`Advection`].
    #[default]
    Advection,
    /// [`Drag`].
    SimpleDrag,
    /// [`FullForce`].
    FullForce,
}

impl ModelKind {
    /// Instantiate the selected model.
    pub fn build(self, params: PhysicsParams) -> Arc<dyn PhysicsModel> {
        match self {
            Self::Advection => Arc::new(Advection),
            Self::SimpleDrag => Arc::new(Drag::new(params)),
            Self::FullForce => Arc::new(FullForce::new(params)),
        }
    }
}
