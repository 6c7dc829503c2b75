//! Synthetic raw velocity slices.

use advect_core::{GridDims, RawSlice, SourceHandles};

/// Every node carries the same `(u, v, w)`.
pub fn uniform(dims: GridDims, uvw: [f32; 3]) -> RawSlice {
    let n = dims.cell_count();
    RawSlice {
        dims,
        u: vec![uvw[0]; n],
        v: vec![uvw[1]; n],
        w: vec![uvw[2]; n],
    }
}

/// `u` grows linearly with the node's x index; `v = w = 0`.
pub fn linear_x(dims: GridDims) -> RawSlice {
    let mut raw = uniform(dims, [0.0; 3]);
    for z in 0..dims.depth {
        for y in 0..dims.height {
            for x in 0..dims.width {
                raw.u[dims.index(x, y, z)] = x as f32;
            }
        }
    }
    raw
}

/// Solid-body rotation about the grid's vertical axis.
pub fn vortex(dims: GridDims) -> RawSlice {
    let mut raw = uniform(dims, [0.0; 3]);
    let cx = (dims.width as f32 - 1.0) * 0.5;
    let cy = (dims.height as f32 - 1.0) * 0.5;
    for z in 0..dims.depth {
        for y in 0..dims.height {
            for x in 0..dims.width {
                let i = dims.index(x, y, z);
                raw.u[i] = -(y as f32 - cy);
                raw.v[i] = x as f32 - cx;
            }
        }
    }
    raw
}

/// A uniform slice whose `v / u` ratio identifies `frame`, so the tag
/// survives shared-peak normalisation.
pub fn tagged(dims: GridDims, frame: usize) -> RawSlice {
    uniform(dims, [1.0, tag_ratio(frame), 0.0])
}

/// The normalised `v` component produced by [`tagged`] for `frame`.
pub fn tag_ratio(frame: usize) -> f32 {
    1.0 / (frame as f32 + 2.0)
}

/// Source handles `frame-{i}` for `i in 0..count`.
pub fn handles(count: usize) -> Vec<SourceHandles> {
    (0..count)
        .map(|i| SourceHandles::single(format!("frame-{i}")))
        .collect()
}
