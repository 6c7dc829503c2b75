//! The owning context object.
//!
//! A [`Simulation`] holds every subsystem: the CPU field window, the
//! frame clock and schedule, the particle integrator, the GPU bridge,
//! and the background loader. The frame driver calls
//! [`Simulation::frame`] once per display frame.
//!
//! # Frame sequence
//!
//! 1. Advance the [`FrameClock`]. If a step boundary was crossed:
//!    lock the future slot, await the preload fence and rotate the GPU
//!    buffers, rotate the CPU window, unlock, and enqueue the next load.
//!    On a stale future the GPU roles stay put and `prev` is refilled
//!    with `current`, matching the frozen CPU pair.
//! 2. Advance particles over `(prev, current)` at the clock's time
//!    fraction (sequentially, on the pool, or on the device).
//! 3. Upload particle positions.
//! 4. Build the interpolated display lines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use advect_core::{
    PositionReader, SourceHandles, StorageReader, TimeIndex, VariableNames, VelocitySampler,
};
use advect_exec::QueueReport;
use advect_field::{FieldSnapshot, FieldWindow, Freshness};
use advect_gpu::{FenceSlot, FenceWait, FieldBuffers, GpuBridge, GpuDevice};
use advect_physics::{seed_from_geo, seed_particles, ParticleIntegrator, ParticleState};
use tracing::{debug, info};

use crate::clock::{FrameClock, FrameSchedule};
use crate::config::{ConfigError, ExecutionMode, Seeding, SimConfig};
use crate::error::SimError;
use crate::loader::{FieldLoader, LoadOutcome, LoaderStats, PendingLoad};
use crate::metrics::FrameMetrics;

// ── Reports ────────────────────────────────────────────────────────

/// What happened at a step boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RotationReport {
    /// Time index now in `current`.
    pub promoted: TimeIndex,
    /// `true` if the field froze for this interval.
    pub stale: bool,
    /// Result of the preload fence wait.
    pub fence: FenceWait,
    /// `true` if a load still in flight was kept as the next interval's
    /// load instead of enqueueing a new one.
    pub carried_over: bool,
}

/// Everything the frame driver needs to draw one frame.
#[derive(Debug)]
pub struct FrameOutput<'a> {
    /// Flattened `xyz` particle positions. In
    /// [`ExecutionMode::Compute`] the device owns the live positions and
    /// this is the initial placement.
    pub positions: &'a [f32],
    /// Device buffers currently in the field roles.
    pub field_buffers: FieldBuffers,
    /// Interpolated display subsample as line-segment endpoints.
    pub display_lines: &'a [f32],
    /// Position within the current step, in `[0, 1)`.
    pub time_fraction: f32,
    /// Set on frames that crossed a step boundary.
    pub rotation: Option<RotationReport>,
}

/// Report from [`Simulation::shutdown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Loader queue report.
    pub loader: QueueReport,
    /// Particle pool report.
    pub particles: QueueReport,
    /// Frames run before shutdown.
    pub frames: u64,
}

// ── Builder ────────────────────────────────────────────────────────

/// Assembles a [`Simulation`].
pub struct SimulationBuilder<D: GpuDevice> {
    config: SimConfig,
    reader: Arc<dyn StorageReader>,
    positions: Option<Box<dyn PositionReader>>,
    device: Arc<D>,
    frames: Vec<SourceHandles>,
    names: VariableNames,
}

impl<D: GpuDevice> SimulationBuilder<D> {
    /// Replace the default configuration.
    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Reader for [`Seeding::FromFile`].
    pub fn positions(mut self, reader: impl PositionReader + 'static) -> Self {
        self.positions = Some(Box::new(reader));
        self
    }

    /// Variable names looked up in each source. Default: `u`, `v`, `w`.
    pub fn variable_names(mut self, names: VariableNames) -> Self {
        self.names = names;
        self
    }

    /// Validate the configuration, prime the window from the first two
    /// frames, seed particles, allocate device buffers, and enqueue the
    /// third frame.
    pub fn build(self) -> Result<Simulation<D>, SimError> {
        let start = Instant::now();
        let config = self.config;
        config.validate()?;
        if self.frames.is_empty() {
            return Err(ConfigError::NoFrames.into());
        }

        let mut window = FieldWindow::new(config.prepare_params());
        let mut schedule = FrameSchedule::new(self.frames);
        let load_now = |window: &FieldWindow,
                        schedule: &mut FrameSchedule|
         -> Result<FieldSnapshot, SimError> {
            let (frame, time) = schedule.advance();
            let raw = self.reader.read_slice(schedule.handles(frame), &self.names)?;
            Ok(window.prepare(&raw, time, frame)?)
        };
        let first = load_now(&window, &mut schedule)?;
        let second = if schedule.len() > 1 {
            Some(load_now(&window, &mut schedule)?)
        } else {
            None
        };
        window.prime(first, second)?;

        let particles = match &config.seeding {
            Seeding::Pattern(pattern) => {
                seed_particles(*pattern, config.particle_count, &config.extent, config.seed)
            }
            Seeding::FromFile(handle) => {
                let reader = self
                    .positions
                    .as_ref()
                    .ok_or(ConfigError::MissingPositionReader)?;
                let geo = reader.read_positions(handle)?;
                seed_from_geo(&geo, &config.extent)
            }
        };
        let model = config.model.build(config.physics);
        let integrator = ParticleIntegrator::new(particles, model, config.integrator_config())?;

        let bridge = Arc::new(GpuBridge::new(
            self.device,
            &window,
            integrator.positions(),
            config.fence_timeout(),
        )?);
        let fences = Arc::new(FenceSlot::new());
        let mut loader = FieldLoader::new(
            self.reader,
            self.names,
            window.params().clone(),
            Arc::clone(window.future_slot()),
            Arc::clone(&bridge),
            Arc::clone(&fences),
        )?;

        let (frame, time) = schedule.advance();
        let pending = loader.enqueue_load(schedule.handles(frame).clone(), time, frame)?;

        info!(
            frames = schedule.len(),
            particles = integrator.len(),
            model = integrator.model().name(),
            mode = ?config.mode,
            dims = %window.dims().unwrap_or_default(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "simulation ready"
        );

        Ok(Simulation {
            clock: FrameClock::new(config.time_step),
            config,
            window,
            schedule,
            integrator,
            bridge,
            fences,
            loader,
            last_load: Some(pending),
            metrics: FrameMetrics::default(),
            display: Vec::new(),
            report: None,
        })
    }
}

// ── Simulation ─────────────────────────────────────────────────────

/// The streaming particle advection context.
pub struct Simulation<D: GpuDevice> {
    config: SimConfig,
    window: FieldWindow,
    schedule: FrameSchedule,
    clock: FrameClock,
    integrator: ParticleIntegrator,
    bridge: Arc<GpuBridge<D>>,
    fences: Arc<FenceSlot>,
    loader: FieldLoader<D>,
    last_load: Option<PendingLoad>,
    metrics: FrameMetrics,
    display: Vec<f32>,
    report: Option<ShutdownReport>,
}

impl<D: GpuDevice> Simulation<D> {
    /// Start assembling a simulation that streams `frames` (played back
    /// cyclically) from `reader` and draws through `device`.
    pub fn builder(
        reader: Arc<dyn StorageReader>,
        device: Arc<D>,
        frames: Vec<SourceHandles>,
    ) -> SimulationBuilder<D> {
        SimulationBuilder {
            config: SimConfig::default(),
            reader,
            positions: None,
            device,
            frames,
            names: VariableNames::default(),
        }
    }

    /// Run one display frame.
    ///
    /// `elapsed` feeds the frame clock; particles always advance by the
    /// configured `dt`.
    ///
    /// # Panics
    ///
    /// Panics if called after [`shutdown`](Self::shutdown), or if a step
    /// boundary is crossed with no field load outstanding.
    pub fn frame(&mut self, elapsed: f32) -> Result<FrameOutput<'_>, SimError> {
        assert!(self.report.is_none(), "frame() after shutdown");
        let frame_start = Instant::now();

        self.metrics.rotate_us = 0;
        self.metrics.fence_wait_us = 0;
        let rotation = if self.clock.advance(elapsed) {
            Some(self.rotate()?)
        } else {
            None
        };

        let t = self.clock.time_fraction();
        let dt = self.config.dt;
        let step_start = Instant::now();
        match self.config.mode {
            ExecutionMode::Sequential => {
                let sampler = self.window.sampler(t)?;
                self.integrator.step_sequential(&sampler, dt);
            }
            ExecutionMode::Parallel => {
                let sampler: Arc<dyn VelocitySampler> = Arc::new(self.window.sampler(t)?);
                self.integrator.step_parallel(sampler, dt)?;
            }
            ExecutionMode::Compute => {
                self.bridge.dispatch_compute(self.integrator.len(), t, dt)?;
            }
        }
        self.metrics.integrate_us = step_start.elapsed().as_micros() as u64;

        let upload_start = Instant::now();
        if self.config.mode != ExecutionMode::Compute {
            self.bridge.upload_particles(self.integrator.positions())?;
        }
        self.metrics.upload_us = upload_start.elapsed().as_micros() as u64;

        let display_start = Instant::now();
        self.window.display_lines(t, &mut self.display)?;
        self.metrics.display_us = display_start.elapsed().as_micros() as u64;

        self.refresh_counters();
        self.metrics.frames += 1;
        self.metrics.total_us = frame_start.elapsed().as_micros() as u64;

        Ok(FrameOutput {
            positions: self.integrator.positions(),
            field_buffers: self.bridge.field_buffers(),
            display_lines: &self.display,
            time_fraction: t,
            rotation,
        })
    }

    fn rotate(&mut self) -> Result<RotationReport, SimError> {
        assert!(
            self.loader.is_armed(),
            "step boundary crossed with no field load outstanding"
        );
        let start = Instant::now();

        let slot = Arc::clone(self.window.future_slot());
        let mut guard = slot.lock();
        let stale = guard.freshness() != Freshness::Fresh;
        let wait_start = Instant::now();
        let fence = match (stale, self.window.current()) {
            (true, Some(current)) => self.bridge.await_and_freeze(&self.fences, current)?,
            _ => self.bridge.await_and_rotate(&self.fences),
        };
        self.metrics.fence_wait_us = wait_start.elapsed().as_micros() as u64;
        let rotation = self.window.rotate_locked(&mut guard);
        debug_assert_eq!(rotation.stale, stale);
        let carried_over = rotation.stale && self.loader.is_in_flight();
        drop(guard);

        self.metrics.rotations += 1;
        if rotation.stale {
            self.metrics.stale_rotations += 1;
        }
        if carried_over {
            self.metrics.carried_loads += 1;
            debug!(promoted = %rotation.promoted, "field load still in flight; carried over");
        } else {
            self.loader.disarm();
            let (frame, time) = self.schedule.advance();
            let handles = self.schedule.handles(frame).clone();
            self.last_load = Some(self.loader.enqueue_load(handles, time, frame)?);
        }
        self.metrics.rotate_us = start.elapsed().as_micros() as u64;

        Ok(RotationReport {
            promoted: rotation.promoted,
            stale: rotation.stale,
            fence,
            carried_over,
        })
    }

    fn refresh_counters(&mut self) {
        let loads = self.loader.stats();
        let gpu = self.bridge.stats();
        let m = &mut self.metrics;
        m.loads_completed = loads.completed;
        m.loads_failed = loads.failed;
        m.loads_rejected = loads.rejected;
        m.fence_timeouts = gpu.fence_timeouts;
        m.fence_errors = gpu.fence_errors;
    }

    /// Block until the most recently enqueued load ends, up to
    /// `timeout`. Returns `None` on timeout or if its outcome was
    /// already taken.
    pub fn wait_for_load(&self, timeout: Duration) -> Option<LoadOutcome> {
        self.last_load.as_ref()?.wait(timeout)
    }

    /// The most recently enqueued load.
    pub fn last_load(&self) -> Option<&PendingLoad> {
        self.last_load.as_ref()
    }

    /// Replace particle `index`.
    pub fn set_particle(&mut self, index: usize, state: ParticleState) {
        self.integrator.set_particle(index, state);
    }

    /// Configuration in use.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The CPU field window.
    pub fn window(&self) -> &FieldWindow {
        &self.window
    }

    /// The frame clock.
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// The particle integrator.
    pub fn integrator(&self) -> &ParticleIntegrator {
        &self.integrator
    }

    /// The GPU bridge.
    pub fn bridge(&self) -> &Arc<GpuBridge<D>> {
        &self.bridge
    }

    /// Loader counters.
    pub fn loader_stats(&self) -> LoaderStats {
        self.loader.stats()
    }

    /// Metrics of the most recent frame.
    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    /// Drain the loader, join both executors, and report. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        let start = Instant::now();
        let loader = self.loader.shutdown();
        let particles = self.integrator.shutdown();
        self.refresh_counters();
        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            loader,
            particles,
            frames: self.metrics.frames,
        };
        info!(
            frames = report.frames,
            rotations = self.metrics.rotations,
            stale_rotations = self.metrics.stale_rotations,
            loads_completed = self.metrics.loads_completed,
            loads_failed = self.metrics.loads_failed,
            total_ms = report.total_ms,
            "simulation shut down"
        );
        self.report = Some(report.clone());
        report
    }
}

impl<D: GpuDevice> Drop for Simulation<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<D: GpuDevice> std::fmt::Debug for Simulation<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("time_indices", &self.window.time_indices())
            .field("clock", &self.clock)
            .field("particles", &self.integrator.len())
            .field("loader", &self.loader)
            .field("bridge", &self.bridge)
            .finish()
    }
}
