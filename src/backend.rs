//! Byte-range backends the reader fetches from

use crate::error::{CubeError, Result};
use crate::utils::try_alloc_zeroed;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Random access to the bytes of a cube file
///
/// Implementations must never truncate or pad: a fetch that cannot be served
/// in full is an error. Retry policy, caching and cancellation belong here,
/// not in the reader.
pub trait Backend {
    /// Total addressable size in bytes, fixed for the lifetime of the backend
    fn total_size(&self) -> u64;

    /// Fetch exactly `length` bytes starting at `offset`
    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn total_size(&self) -> u64 {
        (**self).total_size()
    }

    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes> {
        (**self).fetch(offset, length)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn total_size(&self) -> u64 {
        (**self).total_size()
    }

    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes> {
        (**self).fetch(offset, length)
    }
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn total_size(&self) -> u64 {
        (**self).total_size()
    }

    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes> {
        (**self).fetch(offset, length)
    }
}

/// Fail unless `offset..offset + length` lies within `total_size`
pub fn check_range(offset: u64, length: u64, total_size: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total_size => Ok(()),
        _ => Err(CubeError::out_of_range(offset, length, total_size)),
    }
}

/// Fetch through `backend` and verify the reply has the requested length
pub(crate) fn fetch_exact<B: Backend + ?Sized>(
    backend: &B,
    offset: u64,
    length: u64,
) -> Result<Bytes> {
    let bytes = backend.fetch(offset, length)?;
    if bytes.len() as u64 != length {
        return Err(CubeError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "backend returned {} bytes for a {} byte read at offset {}",
                bytes.len(),
                length,
                offset
            ),
        )));
    }
    Ok(bytes)
}

/// Backend over bytes already in memory. Fetches are zero-copy slices.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Bytes,
}

impl MemoryBackend {
    /// Serve fetches from `data`
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl Backend for MemoryBackend {
    fn total_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.total_size())?;
        // In range of an in-memory buffer, so both fit in usize
        let start = offset as usize;
        Ok(self.data.slice(start..start + length as usize))
    }
}

/// Backend over any seekable reader
///
/// The cursor is shared, so fetches are serialized behind a mutex; this makes
/// the backend usable from concurrent reads on the same [`crate::Reader`].
#[derive(Debug)]
pub struct ReadSeekBackend<R> {
    inner: Mutex<R>,
    size: u64,
}

/// Backend reading a file on the local filesystem
pub type FileBackend = ReadSeekBackend<File>;

impl<R: Read + Seek> ReadSeekBackend<R> {
    /// Wrap `inner`, measuring its size by seeking to the end
    pub fn new(mut inner: R) -> Result<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner: Mutex::new(inner),
            size,
        })
    }

    /// Recover the wrapped reader
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl FileBackend {
    /// Open the file at `path` for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(file)
    }
}

impl<R: Read + Seek> Backend for ReadSeekBackend<R> {
    fn total_size(&self) -> u64 {
        self.size
    }

    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.size)?;
        let mut buf = try_alloc_zeroed(length)?;
        let mut inner = self.inner.lock();
        inner.seek(SeekFrom::Start(offset))?;
        inner.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Backend delegating to a host callback `(offset, count) -> bytes`
///
/// This is how foreign runtimes plug their own data source into the reader.
/// Replies of the wrong length are rejected as IO errors.
pub struct CallbackBackend<F> {
    callback: F,
    size: u64,
}

impl<F> CallbackBackend<F>
where
    F: Fn(u64, u64) -> io::Result<Vec<u8>>,
{
    /// Serve `size` bytes through `callback(offset, count)`
    pub fn new(size: u64, callback: F) -> Self {
        Self { callback, size }
    }
}

impl<F> std::fmt::Debug for CallbackBackend<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBackend")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl<F> Backend for CallbackBackend<F>
where
    F: Fn(u64, u64) -> io::Result<Vec<u8>>,
{
    fn total_size(&self) -> u64 {
        self.size
    }

    fn fetch(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.size)?;
        let data = (self.callback)(offset, length)?;
        if data.len() as u64 != length {
            return Err(CubeError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "callback returned {} bytes, expected {}",
                    data.len(),
                    length
                ),
            )));
        }
        Ok(Bytes::from(data))
    }
}
