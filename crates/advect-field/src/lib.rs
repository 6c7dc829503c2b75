//! Velocity field snapshots and the triple-buffered field window.
//!
//! A [`FieldSnapshot`] is one time instant of the gridded velocity
//! field, normalised and laid out both as a compact grid for sampling
//! and as an edge list for line rendering. The [`FieldWindow`] keeps
//! three of them in the roles `prev`, `current` and `future` and
//! answers spatiotemporal velocity queries by trilinear interpolation
//! in space and linear interpolation in time.
//!
//! The [`codec`] module defines a small binary grid container and
//! [`GridFileReader`], a storage reader over it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod reader;
pub mod sample;
pub mod snapshot;
pub mod window;

pub use codec::{CodecError, GridFile, GridVariable};
pub use reader::GridFileReader;
pub use sample::{Stencil, WindowSampler};
pub use snapshot::{prepare, FieldSnapshot, Normalization, PrepareParams};
pub use window::{Freshness, FutureGuard, FutureSlot, FieldWindow, Rotation};
