//! Collaborator traits consumed by the streaming core.

use glam::Vec3;

use crate::error::StorageError;
use crate::storage::{GeoPositions, RawSlice, SourceHandle, SourceHandles, VariableNames};

/// Something that answers "what is the fluid velocity here?".
///
/// The field window's sampler implements this; tests substitute
/// analytic fields.
pub trait VelocitySampler: Send + Sync {
    /// Fluid velocity at world position `pos`.
    fn velocity_at(&self, pos: Vec3) -> Vec3;
}

/// Reads one time-slice of a gridded velocity series.
///
/// Implementations are called from the loader thread. A failure to open
/// or read any of the three sources must be reported as an
/// [`StorageError`]; a source that reads cleanly but is empty returns an
/// empty [`RawSlice`].
pub trait StorageReader: Send + Sync + 'static {
    /// Read the `u`, `v`, `w` components named by `names` from `handles`.
    fn read_slice(
        &self,
        handles: &SourceHandles,
        names: &VariableNames,
    ) -> Result<RawSlice, StorageError>;
}

/// Reads particle seed positions from an external positions source.
pub trait PositionReader {
    /// Read every stored particle position.
    fn read_positions(&self, handle: &SourceHandle) -> Result<GeoPositions, StorageError>;
}

impl<F> VelocitySampler for F
where
    F: Fn(Vec3) -> Vec3 + Send + Sync,
{
    fn velocity_at(&self, pos: Vec3) -> Vec3 {
        self(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_samplers() {
        let swirl = |p: Vec3| Vec3::new(-p.y, p.x, 0.0);
        assert_eq!(swirl.velocity_at(Vec3::X), Vec3::Y);
    }
}
