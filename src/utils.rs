//! Utility functions

use crate::error::{CubeError, Result};

/// Read a little-endian `u16` at `offset`. Callers guarantee the bounds.
pub(crate) fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(buf)
}

/// Read a little-endian `u32` at `offset`. Callers guarantee the bounds.
pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Read a little-endian `u64` at `offset`. Callers guarantee the bounds.
pub(crate) fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Read a little-endian `f32` at `offset`. Callers guarantee the bounds.
pub(crate) fn le_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_bits(le_u32(bytes, offset))
}

/// Allocate a zeroed buffer, reporting allocation failure instead of aborting
pub fn try_alloc_zeroed(len: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(len).map_err(|_| CubeError::OutOfMemory(len))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| CubeError::OutOfMemory(len))?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
