//! Data exchanged with the storage collaborator.

use std::fmt;

use crate::error::FieldError;
use crate::geometry::GridDims;

/// Opaque identifier of one backing source (a file path, a descriptor
/// name, or a key into an in-memory store).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub String);

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceHandle {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SourceHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The three sources holding the `u`, `v` and `w` components of one
/// time-step. They may all name the same source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceHandles {
    /// Source of the x component.
    pub u: SourceHandle,
    /// Source of the y component.
    pub v: SourceHandle,
    /// Source of the z component.
    pub w: SourceHandle,
}

impl SourceHandles {
    /// Three distinct sources.
    pub fn new(
        u: impl Into<SourceHandle>,
        v: impl Into<SourceHandle>,
        w: impl Into<SourceHandle>,
    ) -> Self {
        Self {
            u: u.into(),
            v: v.into(),
            w: w.into(),
        }
    }

    /// One source holding all three components.
    pub fn single(handle: impl Into<SourceHandle>) -> Self {
        let h = handle.into();
        Self {
            u: h.clone(),
            v: h.clone(),
            w: h,
        }
    }
}

/// Variable names looked up in each source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableNames {
    /// Name of the x component. Default `u`.
    pub u: String,
    /// Name of the y component. Default `v`.
    pub v: String,
    /// Name of the z component. Default `w`.
    pub w: String,
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            u: "u".into(),
            v: "v".into(),
            w: "w".into(),
        }
    }
}

/// One raw time-slice as read from storage: three flat component
/// arrays in [`GridDims::index`] order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawSlice {
    /// Extents of the slice.
    pub dims: GridDims,
    /// x components.
    pub u: Vec<f32>,
    /// y components.
    pub v: Vec<f32>,
    /// z components.
    pub w: Vec<f32>,
}

impl RawSlice {
    /// `true` if the slice holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Check that every component covers exactly `dims.cell_count()` nodes.
    pub fn check(&self) -> Result<(), FieldError> {
        if self.dims.is_empty() {
            return Err(FieldError::EmptyGrid);
        }
        let expected = self.dims.cell_count();
        for (component, data) in [("u", &self.u), ("v", &self.v), ("w", &self.w)] {
            if data.len() != expected {
                return Err(FieldError::LengthMismatch {
                    component,
                    expected,
                    found: data.len(),
                });
            }
        }
        Ok(())
    }
}

/// Particle seed positions in geographic form, as held by a positions
/// file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoPositions {
    /// Latitudes, one per particle.
    pub lat: Vec<f32>,
    /// Longitudes, one per particle.
    pub lon: Vec<f32>,
    /// Depths, one per particle.
    pub depth: Vec<f32>,
    /// Latitude that maps to the `+H` domain face.
    pub max_lat: f32,
    /// Longitude that maps to the `+W` domain face.
    pub max_lon: f32,
    /// Depth that maps to the `+D` domain face.
    pub max_depth: f32,
}

impl GeoPositions {
    /// Number of complete `(lat, lon, depth)` triples.
    pub fn len(&self) -> usize {
        self.lat.len().min(self.lon.len()).min(self.depth.len())
    }

    /// `true` if there are no complete triples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
