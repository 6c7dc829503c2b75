//! Test utilities for advect development.
//!
//! Provides synthetic velocity slices ([`frames`]) and in-memory
//! implementations of the storage collaborator traits
//! ([`MemoryReader`], [`MemoryPositions`]) with failure and delay
//! injection for exercising the loader's error and race paths.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod frames;
mod memory;

pub use memory::{MemoryPositions, MemoryReader, ReadGate};
