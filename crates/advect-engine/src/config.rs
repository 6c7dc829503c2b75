//! Simulation configuration, validation, and error types.
//!
//! [`SimConfig`] is the builder input for a
//! [`Simulation`](crate::Simulation). [`validate()`](SimConfig::validate)
//! checks every structural invariant once at startup so the frame loop
//! never has to.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use advect_core::{DomainExtent, SourceHandle};
use advect_field::{Normalization, PrepareParams};
use advect_physics::{
    BoundaryPolicy, IntegratorConfig, ModelKind, ParamError, PhysicsParams, SeedPattern,
};

/// Upper bound on particle workers.
const MAX_WORKERS: usize = 64;

// ── ExecutionMode ──────────────────────────────────────────────────

/// Where the particle step runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On the orchestrating thread.
    Sequential,
    /// Chunked across the particle worker pool.
    #[default]
    Parallel,
    /// On the GPU device, through a compute dispatch.
    Compute,
}

// ── Seeding ────────────────────────────────────────────────────────

/// How the initial particle population is placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Seeding {
    /// A built-in pattern of `particle_count` particles.
    Pattern(SeedPattern),
    /// Positions read from a geographic positions source. The particle
    /// count is whatever the source holds.
    FromFile(SourceHandle),
}

impl Default for Seeding {
    fn default() -> Self {
        Self::Pattern(SeedPattern::default())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SimConfig::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `time_step` is NaN, infinite, zero, or negative.
    InvalidTimeStep {
        /// The invalid value.
        value: f32,
    },
    /// `dt` is NaN, infinite, zero, or negative.
    InvalidDt {
        /// The invalid value.
        value: f32,
    },
    /// A display stride is zero.
    ZeroFineness,
    /// `display_scale` is not finite.
    InvalidDisplayScale {
        /// The invalid value.
        value: f32,
    },
    /// The domain extent has a non-positive or non-finite half-size.
    InvalidExtent,
    /// A pattern seeding was asked for zero particles.
    NoParticles,
    /// `worker_count` is `Some(0)`.
    ZeroWorkers,
    /// `fence_timeout_ms` is zero.
    ZeroFenceTimeout,
    /// The physics constants are invalid.
    InvalidPhysics(ParamError),
    /// No source frames were supplied.
    NoFrames,
    /// File seeding was requested without a positions reader.
    MissingPositionReader,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeStep { value } => {
                write!(f, "time_step must be finite and positive, got {value}")
            }
            Self::InvalidDt { value } => write!(f, "dt must be finite and positive, got {value}"),
            Self::ZeroFineness => write!(f, "fineness_xy and fineness_z must be at least 1"),
            Self::InvalidDisplayScale { value } => {
                write!(f, "display_scale must be finite, got {value}")
            }
            Self::InvalidExtent => write!(f, "domain half-sizes must be finite and positive"),
            Self::NoParticles => write!(f, "particle_count must be at least 1"),
            Self::ZeroWorkers => write!(f, "worker_count must be at least 1"),
            Self::ZeroFenceTimeout => write!(f, "fence_timeout_ms must be at least 1"),
            Self::InvalidPhysics(e) => write!(f, "invalid physics params: {e}"),
            Self::NoFrames => write!(f, "at least one source frame is required"),
            Self::MissingPositionReader => {
                write!(f, "file seeding requires a positions reader")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPhysics(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParamError> for ConfigError {
    fn from(e: ParamError) -> Self {
        Self::InvalidPhysics(e)
    }
}

// ── SimConfig ──────────────────────────────────────────────────────

/// Complete configuration for a simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimConfig {
    /// Simulation time between two source frames. Default: 50.
    pub time_step: f32,
    /// Integration step per display frame. Default: 0.02.
    pub dt: f32,
    /// Particle dynamics.
    pub model: ModelKind,
    /// Constants for the inertial models.
    pub physics: PhysicsParams,
    /// Behaviour at the domain faces.
    pub boundary: BoundaryPolicy,
    /// Display stride in x and y. Default: 15.
    pub fineness_xy: usize,
    /// Display stride in z. Default: 5.
    pub fineness_z: usize,
    /// Length exaggeration of displayed vectors. Default: 10.
    pub display_scale: f32,
    /// How raw samples are normalised.
    pub normalization: Normalization,
    /// Simulation domain. Default: 100 x 100 x 50.
    pub extent: DomainExtent,
    /// Particles placed by a pattern seeding. Default: 250 000.
    pub particle_count: usize,
    /// Initial placement.
    pub seeding: Seeding,
    /// Seed for the random seeding patterns. Default: 112358.
    pub seed: u64,
    /// Where the particle step runs.
    pub mode: ExecutionMode,
    /// Particle workers. `None` = auto-detect.
    pub worker_count: Option<usize>,
    /// Bound on each preload fence wait, in milliseconds. Default: 1000.
    pub fence_timeout_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            time_step: 50.0,
            dt: 0.02,
            model: ModelKind::default(),
            physics: PhysicsParams::default(),
            boundary: BoundaryPolicy::default(),
            fineness_xy: 15,
            fineness_z: 5,
            display_scale: 10.0,
            normalization: Normalization::default(),
            extent: DomainExtent::default(),
            particle_count: 250_000,
            seeding: Seeding::default(),
            seed: 112_358,
            mode: ExecutionMode::default(),
            worker_count: None,
            fence_timeout_ms: 1000,
        }
    }
}

impl SimConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConfigError::InvalidTimeStep {
                value: self.time_step,
            });
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::InvalidDt { value: self.dt });
        }
        if self.fineness_xy == 0 || self.fineness_z == 0 {
            return Err(ConfigError::ZeroFineness);
        }
        if !self.display_scale.is_finite() {
            return Err(ConfigError::InvalidDisplayScale {
                value: self.display_scale,
            });
        }
        if !self.extent.is_valid() {
            return Err(ConfigError::InvalidExtent);
        }
        if matches!(self.seeding, Seeding::Pattern(_)) && self.particle_count == 0 {
            return Err(ConfigError::NoParticles);
        }
        if self.worker_count == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::ZeroFenceTimeout);
        }
        self.physics.validate()?;
        Ok(())
    }

    /// Resolve the particle worker count, applying auto-detection if
    /// `None`. Values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, MAX_WORKERS),
        }
    }

    /// Fence wait bound as a [`Duration`].
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// Snapshot preparation parameters.
    pub fn prepare_params(&self) -> PrepareParams {
        PrepareParams {
            extent: self.extent,
            fineness_xy: self.fineness_xy,
            fineness_z: self.fineness_z,
            display_scale: self.display_scale,
            normalization: self.normalization,
        }
    }

    /// Integrator settings.
    pub fn integrator_config(&self) -> IntegratorConfig {
        IntegratorConfig {
            extent: self.extent,
            boundary: self.boundary,
            workers: self.resolved_worker_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = SimConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.time_step, 50.0);
        assert_eq!(c.dt, 0.02);
        assert_eq!((c.fineness_xy, c.fineness_z), (15, 5));
        assert_eq!(c.particle_count, 250_000);
        assert_eq!(c.seed, 112_358);
        assert_eq!(c.fence_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_bad_time_step() {
        for value in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let c = SimConfig {
                time_step: value,
                ..SimConfig::default()
            };
            assert!(matches!(
                c.validate(),
                Err(ConfigError::InvalidTimeStep { .. })
            ));
        }
    }

    #[test]
    fn rejects_zero_fineness() {
        let c = SimConfig {
            fineness_z: 0,
            ..SimConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroFineness));
    }

    #[test]
    fn rejects_zero_particles_only_for_patterns() {
        let c = SimConfig {
            particle_count: 0,
            ..SimConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::NoParticles));
        let c = SimConfig {
            particle_count: 0,
            seeding: Seeding::FromFile("positions".into()),
            ..SimConfig::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers_and_timeout() {
        let c = SimConfig {
            worker_count: Some(0),
            ..SimConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroWorkers));
        let c = SimConfig {
            fence_timeout_ms: 0,
            ..SimConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroFenceTimeout));
    }

    #[test]
    fn physics_errors_are_wrapped() {
        let mut c = SimConfig::default();
        c.physics.mass = 0.0;
        assert_eq!(
            c.validate(),
            Err(ConfigError::InvalidPhysics(ParamError::NonPositiveMass {
                value: 0.0
            }))
        );
    }

    #[test]
    fn worker_count_is_clamped() {
        let c = SimConfig {
            worker_count: Some(1000),
            ..SimConfig::default()
        };
        assert_eq!(c.resolved_worker_count(), 64);
        let auto = SimConfig::default().resolved_worker_count();
        assert!((1..=64).contains(&auto));
    }
}
