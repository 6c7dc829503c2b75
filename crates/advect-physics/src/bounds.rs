//! Domain boundary handling.

use advect_core::{DomainExtent, Vec3};

use crate::state::ParticleState;

/// What happens to a particle that leaves the domain.
///
/// Both policies clamp each axis of the position independently into
/// `[-extent, extent]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Clamp position; velocity is left unchanged.
    #[default]
    Absorb,
    /// Clamp position and zero the velocity component of every axis that
    /// was clamped.
    Reflect,
}

impl BoundaryPolicy {
    /// Bring `p` back inside `extent`.
    ///
    /// A non-finite position component is reset to the domain centre on
    /// that axis, with that velocity component zeroed under either policy.
    pub fn apply(self, extent: &DomainExtent, p: &mut ParticleState) {
        let e = extent.as_vec3();
        let mut pos = p.position.to_array();
        let mut vel = p.velocity.to_array();
        let lim = e.to_array();
        for axis in 0..3 {
            let x = pos[axis];
            if !x.is_finite() {
                pos[axis] = 0.0;
                vel[axis] = 0.0;
            } else if x > lim[axis] || x < -lim[axis] {
                pos[axis] = x.clamp(-lim[axis], lim[axis]);
                if self == Self::Reflect {
                    vel[axis] = 0.0;
                }
            }
        }
        p.position = Vec3::from_array(pos);
        p.velocity = Vec3::from_array(vel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn overshoot_clamps_to_exact_extent() {
        let e = DomainExtent::default();
        let mut p = ParticleState::moving(Vec3::new(150.0, -120.0, 10.0), Vec3::ONE);
        BoundaryPolicy::Absorb.apply(&e, &mut p);
        assert_eq!(p.position, Vec3::new(100.0, -100.0, 10.0));
        assert_eq!(p.velocity, Vec3::ONE);
    }

    #[test]
    fn reflect_zeroes_only_clamped_axes() {
        let e = DomainExtent::default();
        let mut p = ParticleState::moving(Vec3::new(150.0, 0.0, -60.0), Vec3::ONE);
        BoundaryPolicy::Reflect.apply(&e, &mut p);
        assert_eq!(p.position, Vec3::new(100.0, 0.0, -50.0));
        assert_eq!(p.velocity, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn nan_position_is_recentred() {
        let e = DomainExtent::default();
        let mut p = ParticleState::moving(Vec3::new(f32::NAN, 1.0, 1.0), Vec3::ONE);
        BoundaryPolicy::Absorb.apply(&e, &mut p);
        assert_eq!(p.position, Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(p.velocity.x, 0.0);
    }

    proptest! {
        #[test]
        fn policy_is_stable_under_repetition(
            x in -500f32..500.0, y in -500f32..500.0, z in -500f32..500.0,
            reflect in any::<bool>(),
        ) {
            let e = DomainExtent::default();
            let policy = if reflect { BoundaryPolicy::Reflect } else { BoundaryPolicy::Absorb };
            let mut p = ParticleState::moving(Vec3::new(x, y, z), Vec3::new(1.0, -1.0, 2.0));
            policy.apply(&e, &mut p);
            let once = p;
            policy.apply(&e, &mut p);
            prop_assert_eq!(once, p);
            prop_assert!(e.contains(p.position));
            if x > 100.0 {
                prop_assert_eq!(p.position.x, 100.0);
                prop_assert_eq!(p.velocity.x, if reflect { 0.0 } else { 1.0 });
            }
        }
    }
}
