//! Immutable field snapshots and their construction from raw slices.

use advect_core::{DomainExtent, FieldError, GridDims, RawSlice, TimeIndex, Vec3};

use crate::sample::Stencil;

/// Floats per edge in the edge lists: `(start.xyz, end.xyz)`.
pub const FLOATS_PER_EDGE: usize = 6;

// ── Preparation parameters ─────────────────────────────────────────

/// How raw component values are mapped into `[-1, 1]`.
///
/// Both variants use one range shared by `u`, `v` and `w`, so the
/// components keep their magnitudes relative to one another. The
/// default keeps zero velocity at zero; [`Normalization::SharedMinMax`]
/// shifts it whenever the range is asymmetric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Normalization {
    /// Divide by the largest absolute finite sample. Zero stays zero.
    #[default]
    SharedPeak,
    /// Affine map of the shared `[min, max]` onto `[-1, 1]`.
    SharedMinMax,
}

/// Parameters applied when turning a [`RawSlice`] into a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct PrepareParams {
    /// Domain the grid is stretched over.
    pub extent: DomainExtent,
    /// Display stride along x and y. Default: 15.
    pub fineness_xy: usize,
    /// Display stride along z. Default: 5.
    pub fineness_z: usize,
    /// Length multiplier applied to displayed vectors only. Default: 10.
    pub display_scale: f32,
    /// Normalisation rule. Default: [`Normalization::SharedPeak`].
    pub normalization: Normalization,
}

impl Default for PrepareParams {
    fn default() -> Self {
        Self {
            extent: DomainExtent::default(),
            fineness_xy: 15,
            fineness_z: 5,
            display_scale: 10.0,
            normalization: Normalization::SharedPeak,
        }
    }
}

// ── FieldSnapshot ──────────────────────────────────────────────────

/// One fully loaded time instant of the velocity grid.
///
/// Built once by [`prepare`] and never mutated afterwards; the window
/// and loader share it through `Arc`.
#[derive(Clone, Debug)]
pub struct FieldSnapshot {
    time: TimeIndex,
    frame: usize,
    dims: GridDims,
    extent: DomainExtent,
    display_scale: f32,
    velocities: Vec<Vec3>,
    edges: Vec<f32>,
    display_nodes: Vec<u32>,
    display_edges: Vec<f32>,
}

impl FieldSnapshot {
    /// Load sequence number.
    pub fn time(&self) -> TimeIndex {
        self.time
    }

    /// Index of the source frame this snapshot was read from.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Grid extents.
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Domain the grid covers.
    pub fn extent(&self) -> DomainExtent {
        self.extent
    }

    /// Normalised velocity at every node, in [`GridDims::index`] order.
    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    /// Full-resolution edge list: for every node, its world position
    /// followed by position plus normalised velocity. Unscaled; this is
    /// the physics copy uploaded to the GPU.
    pub fn edges(&self) -> &[f32] {
        &self.edges
    }

    /// Grid indices of the display subsample.
    pub fn display_nodes(&self) -> &[u32] {
        &self.display_nodes
    }

    /// Display edge list, velocities multiplied by the display scale.
    pub fn display_edges(&self) -> &[f32] {
        &self.display_edges
    }

    /// Multiplier used for [`display_edges`](Self::display_edges).
    pub fn display_scale(&self) -> f32 {
        self.display_scale
    }

    /// World position of node `index`.
    pub fn node_position(&self, index: usize) -> Vec3 {
        let e = &self.edges[index * FLOATS_PER_EDGE..];
        Vec3::new(e[0], e[1], e[2])
    }

    /// Trilinear interpolation of the grid at world position `pos`.
    pub fn sample_spatial(&self, pos: Vec3) -> Vec3 {
        let s = Stencil::locate(&self.extent, self.dims, pos);
        s.blend(|x, y, z| self.velocities[self.dims.index(x, y, z)])
    }
}

/// Normalise a raw slice and build its snapshot.
///
/// Non-finite samples (fill values) are excluded from the shared range
/// and become zero velocity. A slice whose finite samples are all equal
/// normalises to zero everywhere.
pub fn prepare(
    raw: &RawSlice,
    params: &PrepareParams,
    time: TimeIndex,
    frame: usize,
) -> Result<FieldSnapshot, FieldError> {
    raw.check()?;
    let dims = raw.dims;
    let n = dims.cell_count();

    let (lo, hi) = shared_range(raw);
    let map = Mapper::new(params.normalization, lo, hi);
    let velocities: Vec<Vec3> = (0..n)
        .map(|i| Vec3::new(map.apply(raw.u[i]), map.apply(raw.v[i]), map.apply(raw.w[i])))
        .collect();

    let fxy = params.fineness_xy.max(1);
    let fz = params.fineness_z.max(1);
    let mut edges = Vec::with_capacity(n * FLOATS_PER_EDGE);
    let mut display_nodes = Vec::new();
    let mut display_edges = Vec::new();
    for z in 0..dims.depth {
        for y in 0..dims.height {
            for x in 0..dims.width {
                let i = dims.index(x, y, z);
                let start = params.extent.node_position(dims, x, y, z);
                let vel = velocities[i];
                push_edge(&mut edges, start, start + vel);
                if z % fz == 0 && y % fxy == 0 && x % fxy == 0 {
                    display_nodes.push(i as u32);
                    push_edge(&mut display_edges, start, start + vel * params.display_scale);
                }
            }
        }
    }

    Ok(FieldSnapshot {
        time,
        frame,
        dims,
        extent: params.extent,
        display_scale: params.display_scale,
        velocities,
        edges,
        display_nodes,
        display_edges,
    })
}

pub(crate) fn push_edge(out: &mut Vec<f32>, start: Vec3, end: Vec3) {
    out.extend_from_slice(&[start.x, start.y, start.z, end.x, end.y, end.z]);
}

/// Shared `(min, max)` over the finite samples of all three components.
/// Returns `(0, 0)` if there are none.
fn shared_range(raw: &RawSlice) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in raw.u.iter().chain(&raw.v).chain(&raw.w) {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if lo > hi {
        (0.0, 0.0)
    } else {
        (lo, hi)
    }
}

enum Mapper {
    Scale(f32),
    Affine { lo: f32, inv_span: f32 },
    Zero,
}

impl Mapper {
    fn new(kind: Normalization, lo: f32, hi: f32) -> Self {
        match kind {
            Normalization::SharedPeak => {
                let peak = lo.abs().max(hi.abs());
                if peak > 0.0 {
                    Self::Scale(1.0 / peak)
                } else {
                    Self::Zero
                }
            }
            Normalization::SharedMinMax => {
                if hi > lo {
                    Self::Affine {
                        lo,
                        inv_span: 1.0 / (hi - lo),
                    }
                } else {
                    Self::Zero
                }
            }
        }
    }

    #[inline]
    fn apply(&self, v: f32) -> f32 {
        if !v.is_finite() {
            return 0.0;
        }
        match *self {
            Self::Scale(s) => (v * s).clamp(-1.0, 1.0),
            Self::Affine { lo, inv_span } => ((v - lo) * inv_span * 2.0 - 1.0).clamp(-1.0, 1.0),
            Self::Zero => 0.0,
        }
    }
}
