//! Per-particle kinematic state.

use advect_core::Vec3;

/// Position, velocity and acceleration of one particle.
///
/// Advection only reads `position`; it stores the RK4-averaged fluid
/// velocity in `velocity` so that displays can colour by speed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleState {
    /// World position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Acceleration from the last step.
    pub acceleration: Vec3,
}

impl ParticleState {
    /// A particle at rest at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// A particle at `position` moving with `velocity`.
    pub fn moving(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            acceleration: Vec3::ZERO,
        }
    }
}
