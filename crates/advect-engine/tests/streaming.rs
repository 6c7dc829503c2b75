//! End-to-end streaming: rotation order, stale fields, in-flight loads,
//! and the fence hand-off, all on the headless device.

use std::sync::Arc;
use std::time::Duration;

use advect_core::{
    GeoPositions, GridDims, RawSlice, SourceHandles, StorageError, StorageReader, TimeIndex,
    VariableNames,
};
use advect_engine::{ExecutionMode, LoadOutcome, Seeding, SimConfig, Simulation};
use advect_gpu::{FenceMode, FenceWait, HeadlessGpu};
use advect_physics::{ModelKind, SeedPattern};
use advect_test_utils::{frames, MemoryPositions, MemoryReader};
use crossbeam_channel::{bounded, Receiver, Sender};

const DIMS: GridDims = GridDims {
    width: 6,
    height: 5,
    depth: 3,
};

const LOAD_WAIT: Duration = Duration::from_secs(5);

fn config(mode: ExecutionMode) -> SimConfig {
    SimConfig {
        time_step: 1.0,
        dt: 0.05,
        fineness_xy: 2,
        fineness_z: 1,
        particle_count: 48,
        seeding: Seeding::Pattern(SeedPattern::Line),
        mode,
        worker_count: Some(3),
        fence_timeout_ms: 2000,
        ..SimConfig::default()
    }
}

fn simulation(
    frame_count: usize,
    mode: ExecutionMode,
    fences: FenceMode,
) -> (Simulation<HeadlessGpu>, Arc<MemoryReader>) {
    let (reader, handles) = MemoryReader::tagged_series(DIMS, frame_count);
    let reader = Arc::new(reader);
    let sim = Simulation::builder(reader.clone(), Arc::new(HeadlessGpu::new(fences)), handles)
        .config(config(mode))
        .build()
        .unwrap();
    (sim, reader)
}

/// Wait for the outstanding load, then cross one step boundary.
fn settle_and_rotate(sim: &mut Simulation<HeadlessGpu>) -> advect_engine::RotationReport {
    assert!(sim.wait_for_load(LOAD_WAIT).unwrap().is_completed());
    let step = sim.config().time_step;
    sim.frame(step).unwrap().rotation.unwrap()
}

#[test]
fn startup_primes_two_frames_and_loads_the_third() {
    let (sim, _) = simulation(4, ExecutionMode::Sequential, FenceMode::Immediate);
    let (prev, current, _) = sim.window().time_indices();
    assert_eq!(prev, Some(TimeIndex(0)));
    assert_eq!(current, Some(TimeIndex(1)));
    assert_eq!(sim.last_load().unwrap().frame(), 2);
    assert!(sim.wait_for_load(LOAD_WAIT).unwrap().is_completed());
    assert_eq!(sim.window().future().unwrap().time(), TimeIndex(2));
}

#[test]
fn n_rotations_promote_frame_n_plus_one() {
    let frame_count = 4;
    let (mut sim, _) = simulation(frame_count, ExecutionMode::Sequential, FenceMode::Immediate);
    for n in 1..=7u64 {
        let r = settle_and_rotate(&mut sim);
        assert!(!r.stale);
        assert_eq!(r.fence, FenceWait::Signaled);
        assert_eq!(r.promoted, TimeIndex(n + 1));

        let current = sim.window().current().unwrap();
        assert_eq!(current.frame(), (n as usize + 1) % frame_count);
        let expected = frames::tag_ratio(current.frame());
        let v = current.velocities()[0];
        assert!((v.y / v.x - expected).abs() < 1e-5);
    }
    // Steady state: strictly increasing time indices.
    assert!(sim.wait_for_load(LOAD_WAIT).unwrap().is_completed());
    let (p, c, f) = sim.window().time_indices();
    assert!(p.unwrap() < c.unwrap() && c.unwrap() < f.unwrap());
    assert_eq!(sim.metrics().rotations, 7);
    assert_eq!(sim.metrics().stale_rotations, 0);
}

/// The device `prev`/`current` buffers hold the CPU window's pair.
fn assert_gpu_matches_cpu(sim: &Simulation<HeadlessGpu>) {
    let buffers = sim.bridge().field_buffers();
    let gpu = sim.bridge().device();
    assert_eq!(
        gpu.read_buffer(buffers.current).unwrap(),
        sim.window().current().unwrap().edges()
    );
    assert_eq!(
        gpu.read_buffer(buffers.prev).unwrap(),
        sim.window().prev().unwrap().edges()
    );
}

#[test]
fn gpu_current_buffer_tracks_cpu_current() {
    let (mut sim, _) = simulation(3, ExecutionMode::Parallel, FenceMode::Immediate);
    for _ in 0..4 {
        settle_and_rotate(&mut sim);
        assert_gpu_matches_cpu(&sim);
    }
}

#[test]
fn gpu_buffers_freeze_with_cpu_after_failed_load() {
    let (mut sim, reader) = simulation(4, ExecutionMode::Compute, FenceMode::Immediate);
    reader.fail("frame-3");
    settle_and_rotate(&mut sim);
    assert_gpu_matches_cpu(&sim);

    assert!(!sim.wait_for_load(LOAD_WAIT).unwrap().is_completed());
    let step = sim.config().time_step;
    let out = sim.frame(step).unwrap();
    assert!(out.rotation.unwrap().stale);
    let dispatched = out.field_buffers;
    assert_gpu_matches_cpu(&sim);
    assert_eq!(sim.bridge().stats().freezes, 1);

    // The kernel keeps reading the frozen pair until the next fresh load.
    let last = *sim.bridge().device().dispatches().last().unwrap();
    assert_eq!((last.prev, last.current), (dispatched.prev, dispatched.current));

    settle_and_rotate(&mut sim);
    assert_gpu_matches_cpu(&sim);
    assert_eq!(sim.window().current().unwrap().frame(), 0);
}

#[test]
fn failed_load_freezes_field_for_one_interval() {
    let (mut sim, reader) = simulation(4, ExecutionMode::Sequential, FenceMode::Immediate);
    // Frame 2 is already loading; fail frame 3, the next one.
    reader.fail("frame-3");
    settle_and_rotate(&mut sim);

    match sim.wait_for_load(LOAD_WAIT) {
        Some(LoadOutcome::Failed { time, .. }) => assert_eq!(time, TimeIndex(3)),
        other => panic!("expected a failed load, got {other:?}"),
    }
    let step = sim.config().time_step;
    let r = sim.frame(step).unwrap().rotation.unwrap();
    assert!(r.stale);
    assert!(!r.carried_over);
    assert_eq!(r.fence, FenceWait::NoFence);
    assert_eq!(r.promoted, TimeIndex(2));
    let (p, c, _) = sim.window().time_indices();
    assert_eq!(p, c);

    // The schedule moved on to frame 0 (time 4) and streaming resumes.
    let r = settle_and_rotate(&mut sim);
    assert!(!r.stale);
    assert_eq!(r.promoted, TimeIndex(4));
    assert_eq!(sim.window().current().unwrap().frame(), 0);
    assert_eq!(sim.metrics().stale_rotations, 1);
    assert_eq!(sim.metrics().loads_failed, 1);
}

/// Holds reads of one handle until released.
struct HoldOne {
    inner: Arc<MemoryReader>,
    held: String,
    release: Receiver<()>,
}

impl StorageReader for HoldOne {
    fn read_slice(
        &self,
        handles: &SourceHandles,
        names: &VariableNames,
    ) -> Result<RawSlice, StorageError> {
        if handles.u.0 == self.held {
            let _ = self.release.recv();
        }
        self.inner.read_slice(handles, names)
    }
}

fn held_simulation(held: &str) -> (Simulation<HeadlessGpu>, Sender<()>) {
    let (reader, handles) = MemoryReader::tagged_series(DIMS, 4);
    let (tx, rx) = bounded(1);
    let reader = HoldOne {
        inner: Arc::new(reader),
        held: held.to_owned(),
        release: rx,
    };
    let sim = Simulation::builder(
        Arc::new(reader),
        Arc::new(HeadlessGpu::default()),
        handles,
    )
    .config(config(ExecutionMode::Sequential))
    .build()
    .unwrap();
    (sim, tx)
}

#[test]
fn load_in_flight_at_boundary_is_carried_over() {
    let (mut sim, release) = held_simulation("frame-2");
    let step = sim.config().time_step;

    let r = sim.frame(step).unwrap().rotation.unwrap();
    assert!(r.stale);
    assert!(r.carried_over);
    assert_eq!(r.promoted, TimeIndex(1));
    assert_eq!(sim.loader_stats().enqueued, 1);
    assert_gpu_matches_cpu(&sim);

    release.send(()).unwrap();
    let r = settle_and_rotate(&mut sim);
    assert!(!r.stale);
    assert_eq!(r.promoted, TimeIndex(2));
    assert_gpu_matches_cpu(&sim);
    assert_eq!(sim.loader_stats().enqueued, 2);
    assert_eq!(sim.loader_stats().rejected, 0);
    assert_eq!(sim.metrics().carried_loads, 1);
}

#[test]
fn rotation_waits_for_delayed_preload_fence() {
    let (mut sim, _) = simulation(
        3,
        ExecutionMode::Sequential,
        FenceMode::Delayed(Duration::from_millis(300)),
    );
    assert!(sim.wait_for_load(LOAD_WAIT).unwrap().is_completed());

    // The CPU side is published but the device has not finished the
    // upload into the future buffer yet.
    let future_buf = sim.bridge().field_buffers().future;
    let future_edges = sim.window().future().unwrap().edges().to_vec();
    assert_ne!(
        sim.bridge().device().read_buffer(future_buf).unwrap(),
        future_edges
    );

    let step = sim.config().time_step;
    let r = sim.frame(step).unwrap().rotation.unwrap();
    assert_eq!(r.fence, FenceWait::Signaled);
    let current_buf = sim.bridge().field_buffers().current;
    assert_eq!(current_buf, future_buf);
    assert_eq!(
        sim.bridge().device().read_buffer(current_buf).unwrap(),
        future_edges
    );
    assert!(sim.metrics().fence_wait_us > 0);
}

#[test]
fn fence_timeout_is_logged_and_rotation_proceeds() {
    let (reader, handles) = MemoryReader::tagged_series(DIMS, 3);
    let mut sim = Simulation::builder(
        Arc::new(reader),
        Arc::new(HeadlessGpu::new(FenceMode::Manual)),
        handles,
    )
    .config(SimConfig {
        fence_timeout_ms: 10,
        ..config(ExecutionMode::Sequential)
    })
    .build()
    .unwrap();

    let r = settle_and_rotate(&mut sim);
    assert_eq!(r.fence, FenceWait::Timeout);
    assert!(!r.stale);
    assert_eq!(sim.metrics().fence_timeouts, 1);
    assert_eq!(sim.window().current().unwrap().time(), TimeIndex(2));
}

#[test]
fn sequential_and_parallel_modes_agree() {
    let (mut seq, _) = simulation(3, ExecutionMode::Sequential, FenceMode::Immediate);
    let (mut par, _) = simulation(3, ExecutionMode::Parallel, FenceMode::Immediate);
    let initial = seq.integrator().positions().to_vec();
    // Stay inside the first interval so both runs sample the same pair.
    for _ in 0..8 {
        let a = seq.frame(0.1).unwrap().positions.to_vec();
        let b = par.frame(0.1).unwrap().positions.to_vec();
        assert_eq!(a, b);
    }
    assert_ne!(seq.integrator().positions(), &initial[..]);
}

#[test]
fn compute_mode_dispatches_over_prev_and_current() {
    let (mut sim, _) = simulation(3, ExecutionMode::Compute, FenceMode::Immediate);
    let before = sim.integrator().positions().to_vec();
    let out = sim.frame(0.25).unwrap();
    assert_eq!(out.positions, &before[..]);
    let buffers = out.field_buffers;
    let dispatches = sim.bridge().device().dispatches();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].prev, buffers.prev);
    assert_eq!(dispatches[0].current, buffers.current);
    assert_eq!(dispatches[0].particle_count, 48);
    assert!((dispatches[0].time_fraction - 0.25).abs() < 1e-6);
}

#[test]
fn display_lines_cover_the_subsample() {
    let (mut sim, _) = simulation(3, ExecutionMode::Sequential, FenceMode::Immediate);
    let nodes = sim.window().current().unwrap().display_nodes().len();
    let out = sim.frame(0.5).unwrap();
    assert_eq!(out.display_lines.len(), nodes * 6);
    assert!((out.time_fraction - 0.5).abs() < 1e-6);
}

#[test]
fn single_frame_dataset_cycles_on_itself() {
    let (mut sim, _) = simulation(1, ExecutionMode::Sequential, FenceMode::Immediate);
    let (p, c, _) = sim.window().time_indices();
    assert_eq!((p, c), (Some(TimeIndex(0)), Some(TimeIndex(0))));
    let r = settle_and_rotate(&mut sim);
    assert_eq!(r.promoted, TimeIndex(1));
    assert_eq!(sim.window().current().unwrap().frame(), 0);
}

#[test]
fn file_seeding_uses_positions_reader() {
    let (reader, handles) = MemoryReader::tagged_series(DIMS, 2);
    let geo = GeoPositions {
        lat: vec![0.0, 10.0, -10.0],
        lon: vec![0.0, 20.0, -20.0],
        depth: vec![0.0, 5.0, 10.0],
        max_lat: 10.0,
        max_lon: 20.0,
        max_depth: 10.0,
    };
    let sim = Simulation::builder(Arc::new(reader), Arc::new(HeadlessGpu::default()), handles)
        .config(SimConfig {
            seeding: Seeding::FromFile("positions".into()),
            ..config(ExecutionMode::Sequential)
        })
        .positions(MemoryPositions(geo))
        .build()
        .unwrap();
    assert_eq!(sim.integrator().len(), 3);
    let extent = sim.config().extent;
    for p in sim.integrator().particles() {
        assert!(extent.contains(p.position));
    }
}

#[test]
fn file_seeding_without_reader_is_a_config_error() {
    let (reader, handles) = MemoryReader::tagged_series(DIMS, 2);
    let err = Simulation::builder(Arc::new(reader), Arc::new(HeadlessGpu::default()), handles)
        .config(SimConfig {
            seeding: Seeding::FromFile("positions".into()),
            ..config(ExecutionMode::Sequential)
        })
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        advect_engine::SimError::Config(advect_engine::ConfigError::MissingPositionReader)
    ));
}

#[test]
fn unreadable_startup_frame_fails_build() {
    let (reader, handles) = MemoryReader::tagged_series(DIMS, 3);
    reader.fail("frame-1");
    let err = Simulation::builder(Arc::new(reader), Arc::new(HeadlessGpu::default()), handles)
        .config(config(ExecutionMode::Sequential))
        .build()
        .unwrap_err();
    assert!(matches!(err, advect_engine::SimError::Storage(_)));
}

#[test]
fn every_model_keeps_particles_in_domain() {
    for model in [ModelKind::Advection, ModelKind::SimpleDrag, ModelKind::FullForce] {
        let (reader, handles) = MemoryReader::tagged_series(DIMS, 3);
        let mut sim =
            Simulation::builder(Arc::new(reader), Arc::new(HeadlessGpu::default()), handles)
                .config(SimConfig {
                    model,
                    seeding: Seeding::Pattern(SeedPattern::Explosion),
                    ..config(ExecutionMode::Parallel)
                })
                .build()
                .unwrap();
        for _ in 0..30 {
            sim.frame(0.2).unwrap();
            sim.wait_for_load(Duration::from_millis(1));
        }
        let extent = sim.config().extent;
        for p in sim.integrator().particles() {
            assert!(extent.contains(p.position), "{model:?} left the domain");
        }
    }
}

#[test]
fn shutdown_reports_and_is_idempotent() {
    let (mut sim, _) = simulation(3, ExecutionMode::Parallel, FenceMode::Immediate);
    sim.frame(0.1).unwrap();
    sim.frame(0.1).unwrap();
    let report = sim.shutdown();
    assert_eq!(report.frames, 2);
    assert_eq!(report.loader.workers_joined, 1);
    assert_eq!(report.particles.workers_joined, 3);
    assert_eq!(report.loader.tasks_completed, 1);
    assert_eq!(sim.shutdown(), report);
}
