//! Benchmark fixtures for the advect particle streamer.
//!
//! - [`vortex_window`]: a primed window over two scaled vortex frames
//! - [`seeded_particles`]: deterministic uniform particle placement

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use advect_core::{DomainExtent, GridDims, RawSlice, TimeIndex};
use advect_field::{FieldWindow, PrepareParams};
use advect_physics::{seed_particles, ParticleState, SeedPattern};
use advect_test_utils::frames;

/// Grid of the reference benchmark field.
pub const REFERENCE_DIMS: GridDims = GridDims {
    width: 64,
    height: 64,
    depth: 16,
};

/// A vortex slice with every component multiplied by `k`.
pub fn scaled_vortex(dims: GridDims, k: f32) -> RawSlice {
    let mut s = frames::vortex(dims);
    for c in [&mut s.u, &mut s.v, &mut s.w] {
        c.iter_mut().for_each(|x| *x *= k);
    }
    s
}

/// A window primed with two vortex frames of different strength.
///
/// # Panics
///
/// Panics if `dims` is empty.
pub fn vortex_window(dims: GridDims) -> FieldWindow {
    let mut window = FieldWindow::new(PrepareParams::default());
    let first = window
        .prepare(&scaled_vortex(dims, 1.0), TimeIndex(0), 0)
        .expect("vortex frame prepares");
    let second = window
        .prepare(&scaled_vortex(dims, 2.0), TimeIndex(1), 1)
        .expect("vortex frame prepares");
    window.prime(first, Some(second)).expect("matching extents");
    window
}

/// `count` particles spread uniformly over the default domain.
pub fn seeded_particles(count: usize, seed: u64) -> Vec<ParticleState> {
    seed_particles(SeedPattern::Uniform, count, &DomainExtent::default(), seed)
}
