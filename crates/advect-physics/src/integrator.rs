//! The particle integrator.
//!
//! Particles are partitioned once, at construction, into contiguous
//! chunks of `max(count / workers, 1)`. Each chunk owns its particles
//! and its slice of the flattened position buffer behind its own mutex,
//! so a chunk task can only ever write its own index range. A parallel
//! step submits one task per chunk and joins on
//! [`TaskQueue::wait_for_all`]; only then is the flattened buffer
//! reassembled.
//!
//! The sequential path runs the identical per-chunk routine in order on
//! the calling thread. Particles never interact, so the two paths
//! produce bit-identical results.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use advect_core::{DomainExtent, VelocitySampler};
use advect_exec::{QueueReport, TaskQueue};
use tracing::{debug, error};

use crate::bounds::BoundaryPolicy;
use crate::error::StepError;
use crate::model::PhysicsModel;
use crate::state::ParticleState;

/// Floats per particle in the flattened position buffer.
pub const FLOATS_PER_PARTICLE: usize = 3;

/// Static integrator settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntegratorConfig {
    /// Domain particles are confined to.
    pub extent: DomainExtent,
    /// What happens at the domain faces.
    pub boundary: BoundaryPolicy,
    /// Worker threads in the fork-join pool. 1 still creates a pool.
    pub workers: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            extent: DomainExtent::default(),
            boundary: BoundaryPolicy::default(),
            workers: 1,
        }
    }
}

/// Timing and size of one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Particles advanced.
    pub particles: usize,
    /// Chunks (tasks, when parallel).
    pub chunks: usize,
    /// Wall time of the step including the join, in microseconds.
    pub elapsed_us: u64,
}

// ── Chunk ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct Chunk {
    particles: Vec<ParticleState>,
    positions: Vec<f32>,
}

impl Chunk {
    fn new(particles: Vec<ParticleState>) -> Self {
        let mut chunk = Self {
            positions: vec![0.0; particles.len() * FLOATS_PER_PARTICLE],
            particles,
        };
        chunk.write_positions();
        chunk
    }

    fn write_positions(&mut self) {
        for (p, out) in self
            .particles
            .iter()
            .zip(self.positions.chunks_exact_mut(FLOATS_PER_PARTICLE))
        {
            out.copy_from_slice(&p.position.to_array());
        }
    }

    fn advance(
        &mut self,
        model: &dyn PhysicsModel,
        field: &dyn VelocitySampler,
        step: &StepParams,
    ) {
        for p in self.particles.iter_mut() {
            model.advance(field, p, step.dt);
            step.boundary.apply(&step.extent, p);
        }
        self.write_positions();
    }
}

#[derive(Clone, Copy, Debug)]
struct StepParams {
    dt: f32,
    extent: DomainExtent,
    boundary: BoundaryPolicy,
}

type SharedChunk = Arc<Mutex<Chunk>>;

// ── ParticleIntegrator ─────────────────────────────────────────────

/// Owner of the particle array and the fork-join pool that advances it.
#[derive(Debug)]
pub struct ParticleIntegrator {
    model: Arc<dyn PhysicsModel>,
    config: IntegratorConfig,
    chunks: Vec<(usize, SharedChunk)>,
    count: usize,
    positions: Vec<f32>,
    pool: TaskQueue,
}

impl ParticleIntegrator {
    /// Take ownership of `particles` and spawn the worker pool.
    pub fn new(
        particles: Vec<ParticleState>,
        model: Arc<dyn PhysicsModel>,
        config: IntegratorConfig,
    ) -> Result<Self, StepError> {
        let workers = config.workers.max(1);
        let pool = TaskQueue::new("advect-particles", workers)?;
        let count = particles.len();
        let batch = (count / workers).max(1);

        let mut chunks = Vec::with_capacity(count.div_ceil(batch));
        let mut positions = Vec::with_capacity(count * FLOATS_PER_PARTICLE);
        let mut start = 0;
        let mut rest = particles;
        while !rest.is_empty() {
            let tail = rest.split_off(batch.min(rest.len()));
            let chunk = Chunk::new(rest);
            positions.extend_from_slice(&chunk.positions);
            chunks.push((start, Arc::new(Mutex::new(chunk))));
            start += batch;
            rest = tail;
        }
        debug!(
            model = model.name(),
            particles = count,
            chunks = chunks.len(),
            workers,
            "particle integrator ready"
        );

        Ok(Self {
            model,
            config,
            chunks,
            count,
            positions,
            pool,
        })
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.count
    }

    /// `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of chunks the array is partitioned into.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The active physics model.
    pub fn model(&self) -> &Arc<dyn PhysicsModel> {
        &self.model
    }

    /// Static settings.
    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Flattened `xyz` positions as of the last completed step.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// A copy of every particle's state, in index order.
    pub fn particles(&self) -> Vec<ParticleState> {
        let mut out = Vec::with_capacity(self.count);
        for (_, chunk) in &self.chunks {
            out.extend_from_slice(&lock(chunk).particles);
        }
        out
    }

    /// Advance every particle by `dt` on the calling thread.
    pub fn step_sequential(&mut self, field: &dyn VelocitySampler, dt: f32) -> StepStats {
        let start = Instant::now();
        let params = self.step_params(dt);
        for (_, chunk) in &self.chunks {
            lock(chunk).advance(self.model.as_ref(), field, &params);
        }
        self.gather();
        self.stats(start)
    }

    /// Advance every particle by `dt`, one pool task per chunk, and
    /// block until all chunks have finished.
    pub fn step_parallel(
        &mut self,
        field: Arc<dyn VelocitySampler>,
        dt: f32,
    ) -> Result<StepStats, StepError> {
        let start = Instant::now();
        let params = self.step_params(dt);
        for (_, chunk) in &self.chunks {
            let chunk = Arc::clone(chunk);
            let model = Arc::clone(&self.model);
            let field = Arc::clone(&field);
            self.pool.submit(move || {
                lock(&chunk).advance(model.as_ref(), field.as_ref(), &params);
            })?;
        }
        self.pool.wait_for_all();

        // A panicking chunk task poisons that chunk's mutex.
        let mut lost = None;
        for (i, (_, chunk)) in self.chunks.iter().enumerate() {
            if chunk.is_poisoned() {
                chunk.clear_poison();
                error!(chunk = i, "particle chunk task panicked");
                lost.get_or_insert(i);
            }
        }
        self.gather();
        match lost {
            Some(chunk) => Err(StepError::WorkerLost { chunk }),
            None => Ok(self.stats(start)),
        }
    }

    /// Replace particle `index` (e.g. to re-seed it).
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn set_particle(&mut self, index: usize, state: ParticleState) {
        assert!(index < self.count, "particle index {index} out of range");
        let slot = self
            .chunks
            .iter()
            .rposition(|(start, _)| *start <= index)
            .unwrap_or(0);
        let (start, chunk) = &self.chunks[slot];
        let mut c = lock(chunk);
        c.particles[index - start] = state;
        c.write_positions();
        drop(c);
        self.gather();
    }

    /// Join the worker pool. Further parallel steps fail with
    /// [`QueueError::ShutDown`](advect_exec::QueueError::ShutDown);
    /// sequential steps still work. Idempotent.
    pub fn shutdown(&mut self) -> QueueReport {
        self.pool.shutdown()
    }

    fn step_params(&self, dt: f32) -> StepParams {
        StepParams {
            dt,
            extent: self.config.extent,
            boundary: self.config.boundary,
        }
    }

    fn gather(&mut self) {
        for (start, chunk) in &self.chunks {
            let c = lock(chunk);
            let at = start * FLOATS_PER_PARTICLE;
            self.positions[at..at + c.positions.len()].copy_from_slice(&c.positions);
        }
    }

    fn stats(&self, start: Instant) -> StepStats {
        StepStats {
            particles: self.count,
            chunks: self.chunks.len(),
            elapsed_us: start.elapsed().as_micros() as u64,
        }
    }
}

// Particle data is plain values; a panic mid-step leaves every particle
// in either its old or its new state, both valid.
fn lock(chunk: &Mutex<Chunk>) -> MutexGuard<'_, Chunk> {
    chunk.lock().unwrap_or_else(PoisonError::into_inner)
}
