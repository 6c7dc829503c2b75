//! Initial particle placement.
//!
//! Patterns are deterministic for a given `seed`: random draws come
//! from a ChaCha8 stream seeded with it.

use std::f32::consts::TAU;

use advect_core::{DomainExtent, GeoPositions, Vec3};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::state::ParticleState;

/// Horizontal aspect ratio applied to the explosion pattern's x speed.
const EXPLOSION_ASPECT: f32 = 19.3 / 9.0;

/// Upper bound of the explosion pattern's random speed factor.
const EXPLOSION_MAX_SPEED: f32 = 0.6;

/// Built-in seeding patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeedPattern {
    /// Evenly spaced along the main diagonal, at rest.
    Line,
    /// Two interleaved diagonals crossing in x, at rest.
    TwoLines,
    /// All particles at one point near the centre with random planar
    /// velocities and a depth-ramped vertical velocity.
    Explosion,
    /// Uniformly random over the whole domain, at rest.
    #[default]
    Uniform,
}

/// Place `count` particles in `extent` according to `pattern`.
pub fn seed_particles(
    pattern: SeedPattern,
    count: usize,
    extent: &DomainExtent,
    seed: u64,
) -> Vec<ParticleState> {
    let e = extent.as_vec3();
    let n = count as f32;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..count)
        .map(|i| {
            let ramp = 2.0 * i as f32 / n - 1.0;
            match pattern {
                SeedPattern::Line => ParticleState::at(e * ramp),
                SeedPattern::TwoLines => {
                    let frac = i as f32 / n;
                    let x = if i % 2 == 1 { frac - 1.0 } else { 1.0 - frac };
                    ParticleState::at(e * Vec3::new(x, ramp, ramp))
                }
                SeedPattern::Explosion => {
                    let angle = TAU * rng.gen::<f32>();
                    let speed = EXPLOSION_MAX_SPEED * rng.gen::<f32>();
                    let velocity = Vec3::new(
                        e.x * speed * angle.cos() / EXPLOSION_ASPECT,
                        e.y * speed * angle.sin(),
                        e.z * ramp,
                    );
                    ParticleState::moving(Vec3::new(-0.25, 0.25, 0.0), velocity)
                }
                SeedPattern::Uniform => {
                    let u = Vec3::new(rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>());
                    ParticleState::at(e * (u * 2.0 - Vec3::ONE))
                }
            }
        })
        .collect()
}

/// Convert geographic seed positions into domain coordinates.
///
/// Each coordinate maps `[0, max]` onto `[-extent, extent]`. An axis
/// whose maximum is zero or non-finite collapses to the domain centre.
pub fn seed_from_geo(geo: &GeoPositions, extent: &DomainExtent) -> Vec<ParticleState> {
    let map = |v: f32, max: f32, half: f32| {
        if max.is_finite() && max != 0.0 {
            (half * ((v / max) * 2.0 - 1.0)).clamp(-half, half)
        } else {
            0.0
        }
    };
    (0..geo.len())
        .map(|i| {
            ParticleState::at(Vec3::new(
                map(geo.lon[i], geo.max_lon, extent.half_width),
                map(geo.lat[i], geo.max_lat, extent.half_height),
                map(geo.depth[i], geo.max_depth, extent.half_depth),
            ))
        })
        .collect()
}
