//! Error types shared across the advect workspace.
//!
//! [`FieldError`] covers field construction and sampling preconditions;
//! [`StorageError`] covers the storage collaborator. Subsystem crates
//! define their own enums and wrap these where they cross a boundary.

use std::error::Error;
use std::fmt;
use std::io;

use crate::geometry::GridDims;

/// Errors raised while building or querying velocity fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// The window does not yet hold the two snapshots needed for
    /// interpolation.
    NotReady,
    /// A snapshot's extents differ from those already resident.
    DimensionMismatch {
        /// Extents of the resident snapshots.
        expected: GridDims,
        /// Extents of the offending snapshot.
        found: GridDims,
    },
    /// A component array does not cover every grid node.
    LengthMismatch {
        /// Component name (`u`, `v` or `w`).
        component: &'static str,
        /// `width * height * depth`.
        expected: usize,
        /// Actual array length.
        found: usize,
    },
    /// The slice has zero nodes along at least one axis.
    EmptyGrid,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "field window is not ready for sampling"),
            Self::DimensionMismatch { expected, found } => {
                write!(f, "snapshot extents {found} differ from resident {expected}")
            }
            Self::LengthMismatch {
                component,
                expected,
                found,
            } => write!(
                f,
                "component '{component}' has {found} samples, expected {expected}"
            ),
            Self::EmptyGrid => write!(f, "velocity grid has no nodes"),
        }
    }
}

impl Error for FieldError {}

/// Errors reported by a [`StorageReader`](crate::StorageReader) or
/// [`PositionReader`](crate::PositionReader).
///
/// A slice that opens and reads cleanly but holds zero nodes is not an
/// error; it is returned as an empty [`RawSlice`](crate::RawSlice).
#[derive(Debug)]
pub enum StorageError {
    /// A source handle could not be opened.
    Open {
        /// The handle that failed.
        handle: String,
        /// Reader-specific reason.
        reason: String,
    },
    /// A named variable is absent from the source.
    MissingVariable {
        /// The variable that was looked up.
        name: String,
    },
    /// The three components disagree on their extents.
    Extents {
        /// Extents of the `u` component.
        expected: GridDims,
        /// Extents of the disagreeing component.
        found: GridDims,
    },
    /// The source is structurally invalid.
    Malformed {
        /// Description of the problem.
        detail: String,
    },
    /// Underlying I/O failure.
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { handle, reason } => write!(f, "cannot open '{handle}': {reason}"),
            Self::MissingVariable { name } => write!(f, "variable '{name}' not found"),
            Self::Extents { expected, found } => {
                write!(f, "component extents {found} differ from {expected}")
            }
            Self::Malformed { detail } => write!(f, "malformed source: {detail}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
