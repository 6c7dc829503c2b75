//! Fourth-order Runge-Kutta steppers.

use advect_core::{VelocitySampler, Vec3};

use crate::model::PhysicsModel;
use crate::state::ParticleState;

/// RK4 on `dx/dt = v_field(x)`.
///
/// Samples the field four times. Stores the averaged slope in
/// `velocity` and clears `acceleration`.
pub fn advect_step(field: &dyn VelocitySampler, p: &mut ParticleState, dt: f32) {
    let x = p.position;
    let half = 0.5 * dt;
    let v1 = field.velocity_at(x);
    let v2 = field.velocity_at(x + v1 * half);
    let v3 = field.velocity_at(x + v2 * half);
    let v4 = field.velocity_at(x + v3 * dt);
    let slope = (v1 + 2.0 * v2 + 2.0 * v3 + v4) / 6.0;
    p.position = x + slope * dt;
    p.velocity = slope;
    p.acceleration = Vec3::ZERO;
}

/// RK4 on the `(position, velocity)` state with `dv/dt` from `model`.
///
/// Each stage passes the previous stage's acceleration as the state's
/// `acceleration`, which the centripetal and added-mass terms read.
pub fn force_step<M>(model: &M, field: &dyn VelocitySampler, p: &mut ParticleState, dt: f32)
where
    M: PhysicsModel + ?Sized,
{
    let x = p.position;
    let v = p.velocity;
    let half = 0.5 * dt;

    let a1 = model.acceleration(p, field.velocity_at(x));
    let v1 = v;

    let s2 = ParticleState {
        position: x + v1 * half,
        velocity: v + a1 * half,
        acceleration: a1,
    };
    let a2 = model.acceleration(&s2, field.velocity_at(s2.position));
    let v2 = s2.velocity;

    let s3 = ParticleState {
        position: x + v2 * half,
        velocity: v + a2 * half,
        acceleration: a2,
    };
    let a3 = model.acceleration(&s3, field.velocity_at(s3.position));
    let v3 = s3.velocity;

    let s4 = ParticleState {
        position: x + v3 * dt,
        velocity: v + a3 * dt,
        acceleration: a3,
    };
    let a4 = model.acceleration(&s4, field.velocity_at(s4.position));
    let v4 = s4.velocity;

    let accel = (a1 + 2.0 * a2 + 2.0 * a3 + a4) / 6.0;
    p.velocity = v + accel * dt;
    p.position = x + (v1 + 2.0 * v2 + 2.0 * v3 + v4) / 6.0 * dt;
    p.acceleration = accel;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Drag, PhysicsParams};

    #[test]
    fn uniform_flow_translates_exactly() {
        let field = |_: Vec3| Vec3::new(1.0, -2.0, 0.5);
        let mut p = ParticleState::at(Vec3::ZERO);
        advect_step(&field, &mut p, 0.1);
        assert!((p.position - Vec3::new(0.1, -0.2, 0.05)).length() < 1e-6);
        assert_eq!(p.velocity, Vec3::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn rotation_keeps_radius_to_fourth_order() {
        let field = |p: Vec3| Vec3::new(-p.y, p.x, 0.0);
        let mut p = ParticleState::at(Vec3::X);
        let dt = 0.01;
        for _ in 0..628 {
            advect_step(&field, &mut p, dt);
        }
        let r = p.position.truncate().length();
        assert!((r - 1.0).abs() < 1e-4, "radius drifted to {r}");
    }

    #[test]
    fn drag_relaxes_toward_fluid_velocity() {
        let field = |_: Vec3| Vec3::X;
        let model = Drag::new(PhysicsParams::default());
        let mut p = ParticleState::at(Vec3::ZERO);
        for _ in 0..50 {
            force_step(&model, &field, &mut p, 0.002);
        }
        // Time constant m/b = 0.02; after 0.1 s the gap is e^-5.
        assert!((p.velocity.x - 1.0).abs() < 0.01);
        assert!(p.position.x > 0.0);
    }

    #[test]
    fn force_step_at_rest_in_still_fluid_stays_put() {
        let field = |_: Vec3| Vec3::ZERO;
        let model = Drag::new(PhysicsParams::default());
        let mut p = ParticleState::at(Vec3::new(3.0, 4.0, 5.0));
        force_step(&model, &field, &mut p, 0.02);
        assert_eq!(p.position, Vec3::new(3.0, 4.0, 5.0));
        assert_eq!(p.velocity, Vec3::ZERO);
    }
}
