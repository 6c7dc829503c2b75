//! Binary grid container.
//!
//! A self-describing little-endian container for gridded `f32`
//! variables plus scalar attributes, one file per time-step:
//!
//! ```text
//! [MAGIC "ADVG"] [VERSION u8]
//! [var_count u32] { [name str] [depth u32] [height u32] [width u32] [f32 * d*h*w] } * var_count
//! [attr_count u32] { [name str] [value f32] } * attr_count
//! ```
//!
//! Strings are `u32`-length-prefixed UTF-8. There is no compression
//! and no alignment padding.

use std::fmt;
use std::io::{self, Read, Write};

use advect_core::GridDims;
use indexmap::IndexMap;

/// Magic bytes at the start of every grid container.
pub const MAGIC: [u8; 4] = *b"ADVG";

/// Current container version.
pub const FORMAT_VERSION: u8 = 1;

/// Refuse single variables larger than this many samples.
const MAX_SAMPLES: usize = 1 << 30;

/// Refuse variable and attribute names longer than this many bytes.
const MAX_NAME_LEN: usize = 4096;

// ── Error ──────────────────────────────────────────────────────────

/// Errors from reading or writing a grid container.
#[derive(Debug)]
pub enum CodecError {
    /// Underlying I/O failure.
    Io(io::Error),
    /// The stream does not start with `b"ADVG"`.
    InvalidMagic,
    /// The container version is not supported by this build.
    UnsupportedVersion {
        /// Version byte found in the stream.
        found: u8,
    },
    /// Truncated or inconsistent data.
    Malformed {
        /// What went wrong.
        detail: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected b\"ADVG\")"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported container version {found}")
            }
            Self::Malformed { detail } => write!(f, "malformed container: {detail}"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ── Types ──────────────────────────────────────────────────────────

/// One named gridded variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridVariable {
    /// Extents of the variable.
    pub dims: GridDims,
    /// Samples in [`GridDims::index`] order.
    pub data: Vec<f32>,
}

/// An in-memory grid container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridFile {
    /// Variables in file order.
    pub variables: IndexMap<String, GridVariable>,
    /// Scalar attributes in file order.
    pub attributes: IndexMap<String, f32>,
}

impl GridFile {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable.
    pub fn with_variable(mut self, name: &str, dims: GridDims, data: Vec<f32>) -> Self {
        self.variables
            .insert(name.to_owned(), GridVariable { dims, data });
        self
    }

    /// Add or replace an attribute.
    pub fn with_attribute(mut self, name: &str, value: f32) -> Self {
        self.attributes.insert(name.to_owned(), value);
        self
    }

    /// Look up a variable.
    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.get(name)
    }

    /// Look up an attribute.
    pub fn attribute(&self, name: &str) -> Option<f32> {
        self.attributes.get(name).copied()
    }
}

// ── Primitives ─────────────────────────────────────────────────────

fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), CodecError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_f32_le(w: &mut dyn Write, v: f32) -> Result<(), CodecError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_str(w: &mut dyn Write, s: &str) -> Result<(), CodecError> {
    write_u32_le(w, len_u32(s.len())?)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_u8(r: &mut dyn Read) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32_le(r: &mut dyn Read) -> Result<u32, CodecError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32_le(r: &mut dyn Read) -> Result<f32, CodecError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_str(r: &mut dyn Read) -> Result<String, CodecError> {
    let len = read_u32_le(r)? as usize;
    if len > MAX_NAME_LEN {
        return Err(CodecError::Malformed {
            detail: format!("name length {len} exceeds {MAX_NAME_LEN}"),
        });
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| CodecError::Malformed {
        detail: format!("invalid UTF-8 name: {e}"),
    })
}

fn len_u32(n: usize) -> Result<u32, CodecError> {
    u32::try_from(n).map_err(|_| CodecError::Malformed {
        detail: format!("length {n} exceeds u32"),
    })
}

// ── Container ──────────────────────────────────────────────────────

/// Write `file` to `w`.
pub fn write_grid(w: &mut dyn Write, file: &GridFile) -> Result<(), CodecError> {
    w.write_all(&MAGIC)?;
    w.write_all(&[FORMAT_VERSION])?;

    write_u32_le(w, len_u32(file.variables.len())?)?;
    for (name, var) in &file.variables {
        if var.dims.checked_cell_count() != Some(var.data.len()) {
            return Err(CodecError::Malformed {
                detail: format!(
                    "variable '{name}' has {} samples for extents {}",
                    var.data.len(),
                    var.dims
                ),
            });
        }
        write_str(w, name)?;
        write_u32_le(w, len_u32(var.dims.depth)?)?;
        write_u32_le(w, len_u32(var.dims.height)?)?;
        write_u32_le(w, len_u32(var.dims.width)?)?;
        let mut bytes = Vec::with_capacity(var.data.len() * 4);
        for v in &var.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        w.write_all(&bytes)?;
    }

    write_u32_le(w, len_u32(file.attributes.len())?)?;
    for (name, value) in &file.attributes {
        write_str(w, name)?;
        write_f32_le(w, *value)?;
    }
    Ok(())
}

/// Read a container from `r`.
pub fn read_grid(r: &mut dyn Read) -> Result<GridFile, CodecError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion { found: version });
    }

    let mut file = GridFile::new();
    let var_count = read_u32_le(r)?;
    for _ in 0..var_count {
        let name = read_str(r)?;
        let depth = read_u32_le(r)? as usize;
        let height = read_u32_le(r)? as usize;
        let width = read_u32_le(r)? as usize;
        let dims = GridDims::new(width, height, depth);
        let n = match dims.checked_cell_count() {
            Some(n) if n <= MAX_SAMPLES => n,
            _ => {
                return Err(CodecError::Malformed {
                    detail: format!("variable '{name}' declares extents {dims}"),
                })
            }
        };
        let mut bytes = vec![0u8; n * 4];
        r.read_exact(&mut bytes)?;
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if file
            .variables
            .insert(name.clone(), GridVariable { dims, data })
            .is_some()
        {
            return Err(CodecError::Malformed {
                detail: format!("duplicate variable '{name}'"),
            });
        }
    }

    let attr_count = read_u32_le(r)?;
    for _ in 0..attr_count {
        let name = read_str(r)?;
        let value = read_f32_le(r)?;
        file.attributes.insert(name, value);
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GridFile {
        let dims = GridDims::new(3, 2, 2);
        GridFile::new()
            .with_variable("u", dims, (0..12).map(|i| i as f32).collect())
            .with_variable("v", dims, vec![0.5; 12])
            .with_attribute("max_lat", 90.0)
    }

    #[test]
    fn container_survives_write_and_read() {
        let file = sample();
        let mut buf = Vec::new();
        write_grid(&mut buf, &file).unwrap();
        let back = read_grid(&mut buf.as_slice()).unwrap();
        assert_eq!(back, file);
        assert_eq!(back.variables.keys().collect::<Vec<_>>(), ["u", "v"]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        write_grid(&mut buf, &sample()).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            read_grid(&mut buf.as_slice()),
            Err(CodecError::InvalidMagic)
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut buf = Vec::new();
        write_grid(&mut buf, &sample()).unwrap();
        buf[4] = FORMAT_VERSION + 1;
        assert!(matches!(
            read_grid(&mut buf.as_slice()),
            Err(CodecError::UnsupportedVersion { found }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn truncated_stream_is_io_error() {
        let mut buf = Vec::new();
        write_grid(&mut buf, &sample()).unwrap();
        buf.truncate(buf.len() - 10);
        assert!(matches!(read_grid(&mut buf.as_slice()), Err(CodecError::Io(_))));
    }

    fn header_with_extents(name: &[u8], depth: u32, height: u32, width: u32) -> Vec<u8> {
        let mut buf = MAGIC.to_vec();
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(name);
        for v in [depth, height, width] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    #[test]
    fn overflowing_extents_are_malformed() {
        let buf = header_with_extents(b"u", u32::MAX, u32::MAX, u32::MAX);
        assert!(matches!(
            read_grid(&mut buf.as_slice()),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn oversized_variable_is_malformed() {
        // 2^31 samples fit in usize but exceed the per-variable cap.
        let buf = header_with_extents(b"u", 1 << 11, 1 << 10, 1 << 10);
        assert!(matches!(
            read_grid(&mut buf.as_slice()),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn huge_name_length_is_malformed() {
        let mut buf = MAGIC.to_vec();
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            read_grid(&mut buf.as_slice()),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn writer_rejects_short_variable() {
        let file = GridFile::new().with_variable("u", GridDims::new(2, 2, 1), vec![1.0; 3]);
        let mut buf = Vec::new();
        assert!(matches!(
            write_grid(&mut buf, &file),
            Err(CodecError::Malformed { .. })
        ));
    }
}
