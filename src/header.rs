//! Locating variable metadata through the file header and trailer
//!
//! Two layouts exist on disk. Legacy files start with a fixed 40-byte header
//! that doubles as the metadata of their single 2D variable. Current files
//! start with a 3-byte marker and keep a 24-byte trailer at the end of the
//! file that points at the serialized root variable.

use crate::backend::{fetch_exact, Backend};
use crate::error::{CubeError, Result};
use crate::utils::{format_bytes, le_u64};
use bytes::Bytes;
use tracing::debug;

/// Magic number opening every header and trailer
pub const MAGIC: &[u8; 2] = b"OM";

/// Bytes fetched from offset 0 to classify a file
pub const HEADER_SIZE: u64 = 40;

/// Size of the trailer at the end of current-layout files
pub const TRAILER_SIZE: u64 = 24;

/// Header version of current-layout files
pub const TRAILER_VERSION: u8 = 3;

/// Layout of a file, decided by the header prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Version 1 or 2: the header prefix is the metadata
    Legacy,
    /// Version 3: the metadata is found through the trailer
    TrailerPointer,
    /// Not a cube file
    Invalid,
}

impl HeaderKind {
    /// Classify a header prefix
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.len() < 3 || &prefix[..2] != MAGIC {
            return HeaderKind::Invalid;
        }
        match prefix[2] {
            1 | 2 => HeaderKind::Legacy,
            TRAILER_VERSION => HeaderKind::TrailerPointer,
            _ => HeaderKind::Invalid,
        }
    }
}

/// Decoded trailer: where the root variable's metadata lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub variable_offset: u64,
    pub variable_size: u64,
}

impl Trailer {
    /// Parse a trailer, `None` if the marker is wrong or the slice too short
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if (bytes.len() as u64) < TRAILER_SIZE
            || &bytes[..2] != MAGIC
            || bytes[2] != TRAILER_VERSION
        {
            return None;
        }
        // bytes 3..8 are reserved
        Some(Self {
            variable_offset: le_u64(bytes, 8),
            variable_size: le_u64(bytes, 16),
        })
    }

    /// Serialize into the on-disk trailer layout
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE as usize] {
        let mut out = [0u8; TRAILER_SIZE as usize];
        out[..2].copy_from_slice(MAGIC);
        out[2] = TRAILER_VERSION;
        out[8..16].copy_from_slice(&self.variable_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.variable_size.to_le_bytes());
        out
    }
}

/// Metadata resolved from a file
#[derive(Debug, Clone)]
pub struct Located {
    pub kind: HeaderKind,
    pub metadata: Bytes,
}

/// Find and fetch the root variable's metadata
pub fn locate<B: Backend + ?Sized>(backend: &B) -> Result<Located> {
    let total_size = backend.total_size();
    if total_size < HEADER_SIZE {
        return Err(CubeError::InvalidArgument(format!(
            "source of {} bytes is smaller than the {} byte header",
            total_size, HEADER_SIZE
        )));
    }

    let header = fetch_exact(backend, 0, HEADER_SIZE)?;
    let kind = HeaderKind::detect(&header);
    debug!(?kind, total_size, "classified header");

    let metadata = match kind {
        HeaderKind::Invalid => {
            return Err(CubeError::NotAFormatFile(
                "unrecognized header marker".to_string(),
            ))
        }
        HeaderKind::Legacy => header,
        HeaderKind::TrailerPointer => {
            let trailer_offset = total_size.checked_sub(TRAILER_SIZE).ok_or_else(|| {
                CubeError::InvalidArgument(format!(
                    "source of {} bytes is smaller than the {} byte trailer",
                    total_size, TRAILER_SIZE
                ))
            })?;
            let trailer_bytes = fetch_exact(backend, trailer_offset, TRAILER_SIZE)?;
            let trailer = Trailer::parse(&trailer_bytes)
                .ok_or_else(|| CubeError::NotAFormatFile("corrupt trailer".to_string()))?;
            check_pointer(&trailer, total_size)?;

            debug!(
                offset = trailer.variable_offset,
                size = %format_bytes(trailer.variable_size),
                "following trailer to variable metadata"
            );
            fetch_exact(backend, trailer.variable_offset, trailer.variable_size)?
        }
    };

    Ok(Located { kind, metadata })
}

fn check_pointer(trailer: &Trailer, total_size: u64) -> Result<()> {
    let in_bounds = trailer
        .variable_offset
        .checked_add(trailer.variable_size)
        .is_some_and(|end| end <= total_size);
    if trailer.variable_size == 0 || !in_bounds {
        return Err(CubeError::InvalidArgument(format!(
            "trailer points at {} bytes at offset {} in a {} byte file",
            trailer.variable_size, trailer.variable_offset, total_size
        )));
    }
    Ok(())
}
