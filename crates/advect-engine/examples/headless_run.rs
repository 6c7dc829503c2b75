//! Stream a synthetic vortex series through the headless device and
//! print what each rotation did.
//!
//! ```text
//! cargo run -p advect-engine --example headless_run
//! ```

use std::sync::Arc;
use std::time::Duration;

use advect_core::{GridDims, RawSlice};
use advect_engine::{ExecutionMode, SimConfig, Simulation};
use advect_gpu::{FenceMode, HeadlessGpu};
use advect_physics::{ModelKind, SeedPattern};
use advect_test_utils::{frames, MemoryReader};
use tracing::Level;

fn scaled(base: &RawSlice, k: f32) -> RawSlice {
    let mut s = base.clone();
    for c in [&mut s.u, &mut s.v, &mut s.w] {
        c.iter_mut().for_each(|x| *x *= k);
    }
    s
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let dims = GridDims::new(32, 32, 8);
    let base = frames::vortex(dims);
    let reader = MemoryReader::new();
    let handles = frames::handles(6);
    for (i, h) in handles.iter().enumerate() {
        reader.insert(&h.u.0, scaled(&base, 1.0 + i as f32 * 0.25));
    }

    let config = SimConfig {
        time_step: 1.0,
        dt: 0.5,
        particle_count: 20_000,
        seeding: advect_engine::Seeding::Pattern(SeedPattern::Uniform),
        model: ModelKind::SimpleDrag,
        mode: ExecutionMode::Parallel,
        fineness_xy: 4,
        fineness_z: 2,
        ..SimConfig::default()
    };
    let device = Arc::new(HeadlessGpu::new(FenceMode::Delayed(Duration::from_millis(5))));
    let mut sim = Simulation::builder(Arc::new(reader), device, handles)
        .config(config)
        .build()?;

    for i in 0..240 {
        let out = sim.frame(1.0 / 30.0)?;
        if let Some(r) = out.rotation {
            println!(
                "frame {i:>3}: promoted {} stale={} fence={:?} carried={}",
                r.promoted, r.stale, r.fence, r.carried_over
            );
        }
    }

    let m = sim.metrics().clone();
    println!(
        "last frame: {} us (integrate {} us, upload {} us)",
        m.total_us, m.integrate_us, m.upload_us
    );
    let report = sim.shutdown();
    println!(
        "{} frames, {} rotations ({} stale), {} loads, shutdown in {} ms",
        report.frames, m.rotations, m.stale_rotations, m.loads_completed, report.total_ms
    );
    Ok(())
}
