//! Domain extents and grid dimensions.
//!
//! The simulation domain is the axis-aligned box
//! `[-W, W] × [-H, H] × [-D, D]` described by [`DomainExtent`]. A
//! velocity grid of [`GridDims`] nodes is stretched over that box, node
//! `x` sitting at world coordinate `W * (2x / width - 1)` (and likewise
//! for the other axes).

use std::fmt;

use glam::Vec3;

/// Half-extents of the simulation domain along each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DomainExtent {
    /// Half-width `W` (x axis).
    pub half_width: f32,
    /// Half-height `H` (y axis).
    pub half_height: f32,
    /// Half-depth `D` (z axis).
    pub half_depth: f32,
}

impl Default for DomainExtent {
    fn default() -> Self {
        Self {
            half_width: 100.0,
            half_height: 100.0,
            half_depth: 50.0,
        }
    }
}

impl DomainExtent {
    /// Create an extent from its three half-lengths.
    pub fn new(half_width: f32, half_height: f32, half_depth: f32) -> Self {
        Self {
            half_width,
            half_height,
            half_depth,
        }
    }

    /// The half-extents as a vector `(W, H, D)`.
    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.half_width, self.half_height, self.half_depth)
    }

    /// `true` if every half-length is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.half_width, self.half_height, self.half_depth]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    /// Clamp each axis of `pos` independently into the domain.
    pub fn clamp(&self, pos: Vec3) -> Vec3 {
        let e = self.as_vec3();
        pos.clamp(-e, e)
    }

    /// `true` if `pos` lies inside the closed domain box.
    pub fn contains(&self, pos: Vec3) -> bool {
        let e = self.as_vec3();
        pos.cmpge(-e).all() && pos.cmple(e).all()
    }

    /// Map a world position to continuous grid coordinates.
    ///
    /// The result is not clamped; `-extent` maps to 0 and `+extent` to
    /// the axis dimension.
    pub fn to_grid(&self, pos: Vec3, dims: GridDims) -> Vec3 {
        let unit = (pos / self.as_vec3() + Vec3::ONE) * 0.5;
        unit * dims.as_vec3()
    }

    /// World position of grid node `(x, y, z)`.
    pub fn node_position(&self, dims: GridDims, x: usize, y: usize, z: usize) -> Vec3 {
        let g = Vec3::new(x as f32, y as f32, z as f32);
        (g / dims.as_vec3() * 2.0 - Vec3::ONE) * self.as_vec3()
    }
}

/// Extents of a dense 3-D velocity grid.
///
/// Storage is row-major with `x` fastest: node `(x, y, z)` lives at
/// `(z * height + y) * width + x`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridDims {
    /// Number of nodes along x.
    pub width: usize,
    /// Number of nodes along y.
    pub height: usize,
    /// Number of nodes along z.
    pub depth: usize,
}

impl GridDims {
    /// Create grid dimensions.
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Total number of grid nodes.
    ///
    /// Use [`checked_cell_count`](Self::checked_cell_count) for extents
    /// read from untrusted input.
    pub fn cell_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Total number of grid nodes, or `None` if it overflows `usize`.
    pub fn checked_cell_count(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.depth)
    }

    /// `true` if any axis has zero nodes.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// Flat index of node `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// The extents as a float vector `(width, height, depth)`.
    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.width as f32, self.height as f32, self.depth as f32)
    }
}

impl fmt::Display for GridDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}
