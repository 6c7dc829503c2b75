//! Trilinear-in-space, linear-in-time velocity sampling.

use std::sync::Arc;

use advect_core::{DomainExtent, GridDims, VelocitySampler, Vec3};

use crate::snapshot::FieldSnapshot;

/// Largest time fraction accepted; sampling never extrapolates past
/// the later snapshot.
const MAX_FRACTION: f32 = 1.0 - f32::EPSILON;

/// The 8-corner stencil for one query position.
///
/// Every index lies in `[0, dim - 1]` on its axis. The base index is
/// clamped to `[0, dim - 2]` so the `+1` neighbour exists; on an axis
/// with a single node both corners are node 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stencil {
    /// Lower corner `(x, y, z)`.
    pub lo: [usize; 3],
    /// Upper corner `(x, y, z)`.
    pub hi: [usize; 3],
    /// Interpolation weights toward `hi`, each in `[0, 1]`.
    pub frac: [f32; 3],
}

impl Stencil {
    /// Locate `pos` on a grid of `dims` stretched over `extent`.
    pub fn locate(extent: &DomainExtent, dims: GridDims, pos: Vec3) -> Self {
        let g = extent.to_grid(pos, dims);
        let (lx, hx, fx) = axis(g.x, dims.width);
        let (ly, hy, fy) = axis(g.y, dims.height);
        let (lz, hz, fz) = axis(g.z, dims.depth);
        Self {
            lo: [lx, ly, lz],
            hi: [hx, hy, hz],
            frac: [fx, fy, fz],
        }
    }

    /// Blend the eight corner values fetched by `at(x, y, z)`.
    #[inline]
    pub fn blend(&self, at: impl Fn(usize, usize, usize) -> Vec3) -> Vec3 {
        let [x0, y0, z0] = self.lo;
        let [x1, y1, z1] = self.hi;
        let [fx, fy, fz] = self.frac;

        let c00 = at(x0, y0, z0).lerp(at(x1, y0, z0), fx);
        let c10 = at(x0, y1, z0).lerp(at(x1, y1, z0), fx);
        let c01 = at(x0, y0, z1).lerp(at(x1, y0, z1), fx);
        let c11 = at(x0, y1, z1).lerp(at(x1, y1, z1), fx);

        let c0 = c00.lerp(c10, fy);
        let c1 = c01.lerp(c11, fy);
        c0.lerp(c1, fz)
    }
}

#[inline]
fn axis(g: f32, dim: usize) -> (usize, usize, f32) {
    let max_base = dim.saturating_sub(2);
    // `as` saturates and maps NaN to 0.
    let base = (g.floor() as isize).clamp(0, max_base as isize) as usize;
    let hi = (base + 1).min(dim.saturating_sub(1));
    let frac = g - base as f32;
    let frac = if frac.is_finite() {
        frac.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (base, hi, frac)
}

/// Clamp a time fraction into `[0, 1)`. NaN maps to 0.
pub(crate) fn clamp_fraction(t: f32) -> f32 {
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, MAX_FRACTION)
    }
}

// ── WindowSampler ──────────────────────────────────────────────────

/// A frozen view of the window's interpolation pair at one time
/// fraction.
///
/// Holds its snapshots by `Arc`, so it can be handed to worker threads
/// and stays valid even if the window rotates meanwhile.
#[derive(Clone, Debug)]
pub struct WindowSampler {
    from: Arc<FieldSnapshot>,
    to: Arc<FieldSnapshot>,
    t: f32,
}

impl WindowSampler {
    /// Sampler blending `from` toward `to` by `t` (clamped to `[0, 1)`).
    pub fn new(from: Arc<FieldSnapshot>, to: Arc<FieldSnapshot>, t: f32) -> Self {
        Self {
            from,
            to,
            t: clamp_fraction(t),
        }
    }

    /// The effective time fraction.
    pub fn fraction(&self) -> f32 {
        self.t
    }

    /// Earlier snapshot of the pair.
    pub fn from_snapshot(&self) -> &Arc<FieldSnapshot> {
        &self.from
    }

    /// Later snapshot of the pair.
    pub fn to_snapshot(&self) -> &Arc<FieldSnapshot> {
        &self.to
    }

    /// Interpolated velocity at `pos`.
    pub fn sample(&self, pos: Vec3) -> Vec3 {
        let a = self.from.sample_spatial(pos);
        if Arc::ptr_eq(&self.from, &self.to) || self.t == 0.0 {
            return a;
        }
        a.lerp(self.to.sample_spatial(pos), self.t)
    }
}

impl VelocitySampler for WindowSampler {
    fn velocity_at(&self, pos: Vec3) -> Vec3 {
        self.sample(pos)
    }
}
