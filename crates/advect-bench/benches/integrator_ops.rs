//! Criterion benchmarks for one particle step, sequential against the
//! chunked fork-join path.

use std::sync::Arc;

use advect_bench::{seeded_particles, vortex_window, REFERENCE_DIMS};
use advect_core::VelocitySampler;
use advect_physics::{IntegratorConfig, ModelKind, ParticleIntegrator, PhysicsParams};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const PARTICLES: usize = 50_000;

fn bench_step(c: &mut Criterion) {
    let window = vortex_window(REFERENCE_DIMS);
    let sampler: Arc<dyn VelocitySampler> = Arc::new(window.sampler(0.5).unwrap());
    let mut group = c.benchmark_group("particle_step");
    group.sample_size(20);

    for model in [ModelKind::Advection, ModelKind::FullForce] {
        let mut seq = ParticleIntegrator::new(
            seeded_particles(PARTICLES, 1),
            model.build(PhysicsParams::default()),
            IntegratorConfig::default(),
        )
        .unwrap();
        group.bench_function(BenchmarkId::new("sequential", format!("{model:?}")), |b| {
            b.iter(|| seq.step_sequential(sampler.as_ref(), 0.02));
        });

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let mut par = ParticleIntegrator::new(
            seeded_particles(PARTICLES, 1),
            model.build(PhysicsParams::default()),
            IntegratorConfig {
                workers,
                ..IntegratorConfig::default()
            },
        )
        .unwrap();
        group.bench_function(BenchmarkId::new("parallel", format!("{model:?}")), |b| {
            b.iter(|| par.step_parallel(Arc::clone(&sampler), 0.02).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
