//! [`GridFileReader`]: a storage reader over grid container files.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use advect_core::{
    GeoPositions, GridDims, PositionReader, RawSlice, SourceHandle, SourceHandles, StorageError,
    StorageReader, VariableNames,
};

use crate::codec::{read_grid, CodecError, GridFile};

/// Reads velocity slices and seed positions from `.advg` containers.
///
/// Handles are paths, resolved against an optional root directory.
/// When all three handles name the same file it is read once.
#[derive(Clone, Debug, Default)]
pub struct GridFileReader {
    root: Option<PathBuf>,
}

impl GridFileReader {
    /// A reader resolving handles as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reader resolving relative handles against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, handle: &SourceHandle) -> PathBuf {
        let p = Path::new(&handle.0);
        match &self.root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p.to_path_buf(),
        }
    }

    fn open(&self, handle: &SourceHandle) -> Result<GridFile, StorageError> {
        let path = self.resolve(handle);
        let file = File::open(&path).map_err(|e| StorageError::Open {
            handle: handle.to_string(),
            reason: e.to_string(),
        })?;
        read_grid(&mut BufReader::new(file)).map_err(|e| codec_to_storage(handle, e))
    }
}

fn codec_to_storage(handle: &SourceHandle, e: CodecError) -> StorageError {
    match e {
        CodecError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            StorageError::Malformed {
                detail: format!("'{handle}' is truncated"),
            }
        }
        CodecError::Io(io) => StorageError::Io(io),
        other => StorageError::Malformed {
            detail: format!("'{handle}': {other}"),
        },
    }
}

fn take_variable(file: &mut GridFile, name: &str) -> Result<(GridDims, Vec<f32>), StorageError> {
    file.variables
        .shift_remove(name)
        .map(|v| (v.dims, v.data))
        .ok_or_else(|| StorageError::MissingVariable { name: name.into() })
}

impl StorageReader for GridFileReader {
    fn read_slice(
        &self,
        handles: &SourceHandles,
        names: &VariableNames,
    ) -> Result<RawSlice, StorageError> {
        let mut u_file = self.open(&handles.u)?;
        let (dims, u) = take_variable(&mut u_file, &names.u)?;

        let mut v_file = if handles.v == handles.u {
            u_file
        } else {
            self.open(&handles.v)?
        };
        let (v_dims, v) = take_variable(&mut v_file, &names.v)?;

        let mut w_file = if handles.w == handles.v {
            v_file
        } else if handles.w == handles.u {
            self.open(&handles.u)?
        } else {
            self.open(&handles.w)?
        };
        let (w_dims, w) = take_variable(&mut w_file, &names.w)?;

        for found in [v_dims, w_dims] {
            if found != dims {
                return Err(StorageError::Extents {
                    expected: dims,
                    found,
                });
            }
        }
        Ok(RawSlice { dims, u, v, w })
    }
}

impl PositionReader for GridFileReader {
    fn read_positions(&self, handle: &SourceHandle) -> Result<GeoPositions, StorageError> {
        let mut file = self.open(handle)?;
        let attr = |file: &GridFile, name: &str| {
            file.attribute(name)
                .ok_or_else(|| StorageError::MissingVariable { name: name.into() })
        };
        let max_lat = attr(&file, "max_lat")?;
        let max_lon = attr(&file, "max_lon")?;
        let max_depth = attr(&file, "max_depth")?;
        let (_, lat) = take_variable(&mut file, "lat")?;
        let (_, lon) = take_variable(&mut file, "lon")?;
        let (_, depth) = take_variable(&mut file, "depth")?;
        Ok(GeoPositions {
            lat,
            lon,
            depth,
            max_lat,
            max_lon,
            max_depth,
        })
    }
}
