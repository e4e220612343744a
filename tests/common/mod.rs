//! Test fixtures: a writer for uncompressed cube files and a planner that
//! reads them.
//!
//! Chunks are stored as raw little-endian `f32` in chunk order. The chunk
//! index holds one `u64` per chunk: the absolute file offset where the chunk
//! ends. Chunk 0 starts at the file's data start.
#![allow(dead_code)]

use bytes::Bytes;
use cubefile::{
    Backend, CompressionType, CubeError, DataRead, DataType, DecodePlan, DecoderError,
    IndexRead, Planner, ReadRequest, Trailer, Variable,
};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Where the writer puts the variable metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Version 2 header doubling as metadata, index right after it
    Legacy,
    /// Current layout: data, index, metadata, trailer
    MetadataAfterData,
    /// Current layout: metadata right after the header, then data and index
    MetadataBeforeData,
}

pub struct CubeFile {
    pub bytes: Vec<u8>,
    pub data_start: u64,
}

pub fn sample_values(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 * 0.25 - 3.0).collect()
}

pub fn chunk_grid(dims: &[u64], chunks: &[u64]) -> Vec<u64> {
    dims.iter().zip(chunks).map(|(d, c)| d.div_ceil(*c)).collect()
}

pub fn chunk_coords(index: u64, grid: &[u64]) -> Vec<u64> {
    let mut coords = vec![0; grid.len()];
    let mut remaining = index;
    for d in (0..grid.len()).rev() {
        coords[d] = remaining % grid[d];
        remaining /= grid[d];
    }
    coords
}

pub fn chunk_extent(coords: &[u64], dims: &[u64], chunks: &[u64]) -> Vec<Range<u64>> {
    coords
        .iter()
        .enumerate()
        .map(|(d, &c)| {
            let start = c * chunks[d];
            start..(start + chunks[d]).min(dims[d])
        })
        .collect()
}

/// Row-major linear index of `pos` within `shape`
pub fn linear(pos: &[u64], shape: &[u64]) -> u64 {
    pos.iter().zip(shape).fold(0, |acc, (p, s)| acc * s + p)
}

/// Visit every position of an N-d box in row-major order
pub fn for_each_position(extent: &[Range<u64>], mut f: impl FnMut(&[u64])) {
    if extent.iter().any(|r| r.start >= r.end) {
        return;
    }
    let mut pos: Vec<u64> = extent.iter().map(|r| r.start).collect();
    loop {
        f(&pos);
        let mut d = extent.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            pos[d] += 1;
            if pos[d] < extent[d].end {
                break;
            }
            pos[d] = extent[d].start;
        }
    }
}

fn encode_chunks(values: &[f32], dims: &[u64], chunks: &[u64]) -> Vec<Vec<u8>> {
    let grid = chunk_grid(dims, chunks);
    let total: u64 = grid.iter().product();
    (0..total)
        .map(|index| {
            let extent = chunk_extent(&chunk_coords(index, &grid), dims, chunks);
            let mut payload = Vec::new();
            for_each_position(&extent, |pos| {
                let value = values[linear(pos, dims) as usize];
                payload.extend_from_slice(&value.to_le_bytes());
            });
            payload
        })
        .collect()
}

pub fn variable_metadata(
    data_type: DataType,
    lut_offset: u64,
    lut_size: u64,
    dims: &[u64],
    chunks: &[u64],
    name: &str,
) -> Vec<u8> {
    let mut bytes = vec![data_type as u8, CompressionType::None as u8];
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&lut_size.to_le_bytes());
    bytes.extend_from_slice(&lut_offset.to_le_bytes());
    bytes.extend_from_slice(&(dims.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&1.0f32.to_le_bytes());
    bytes.extend_from_slice(&0.0f32.to_le_bytes());
    for value in dims.iter().chain(chunks) {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes.extend_from_slice(name.as_bytes());
    bytes
}

fn push_lut(bytes: &mut Vec<u8>, payloads: &[Vec<u8>], data_start: u64) {
    let mut end = data_start;
    for payload in payloads {
        end += payload.len() as u64;
        bytes.extend_from_slice(&end.to_le_bytes());
    }
}

/// Write `values` (row-major, shape `dims`) as a cube file
pub fn build_file(
    placement: Placement,
    data_type: DataType,
    dims: &[u64],
    chunks: &[u64],
    values: &[f32],
) -> CubeFile {
    let payloads = encode_chunks(values, dims, chunks);
    let lut_size = payloads.len() as u64 * 8;
    let data_len: u64 = payloads.iter().map(|p| p.len() as u64).sum();
    let name = "temperature_2m";

    match placement {
        Placement::Legacy => {
            assert_eq!(dims.len(), 2, "legacy files are two dimensional");
            let mut bytes = vec![b'O', b'M', 2, CompressionType::None as u8];
            bytes.extend_from_slice(&1.0f32.to_le_bytes());
            for value in dims.iter().chain(chunks) {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            let data_start = bytes.len() as u64 + lut_size;
            push_lut(&mut bytes, &payloads, data_start);
            bytes.extend(payloads.concat());
            CubeFile { bytes, data_start }
        }
        Placement::MetadataAfterData => {
            let mut bytes = b"OM\x03".to_vec();
            let data_start = bytes.len() as u64;
            bytes.extend(payloads.concat());
            let lut_offset = bytes.len() as u64;
            push_lut(&mut bytes, &payloads, data_start);
            let metadata = variable_metadata(data_type, lut_offset, lut_size, dims, chunks, name);
            let trailer = Trailer {
                variable_offset: bytes.len() as u64,
                variable_size: metadata.len() as u64,
            };
            bytes.extend(metadata);
            bytes.extend_from_slice(&trailer.to_bytes());
            CubeFile { bytes, data_start }
        }
        Placement::MetadataBeforeData => {
            let mut bytes = b"OM\x03".to_vec();
            bytes.resize(16, 0);
            let variable_offset = bytes.len() as u64;
            let metadata_len = variable_metadata(data_type, 0, 0, dims, chunks, name).len() as u64;
            let data_start = variable_offset + metadata_len;
            let lut_offset = data_start + data_len;
            let metadata = variable_metadata(data_type, lut_offset, lut_size, dims, chunks, name);
            bytes.extend_from_slice(&metadata);
            bytes.extend(payloads.concat());
            push_lut(&mut bytes, &payloads, data_start);
            let trailer = Trailer {
                variable_offset,
                variable_size: metadata.len() as u64,
            };
            bytes.extend_from_slice(&trailer.to_bytes());
            CubeFile { bytes, data_start }
        }
    }
}

/// Planner for files written by [`build_file`]
pub struct RawPlanner {
    pub data_start: u64,
}

impl RawPlanner {
    pub fn for_file(file: &CubeFile) -> Self {
        Self {
            data_start: file.data_start,
        }
    }
}

impl Planner for RawPlanner {
    type Plan = RawPlan;

    fn plan(
        &self,
        variable: &Variable<'_>,
        request: &ReadRequest,
    ) -> Result<RawPlan, DecoderError> {
        if variable.data_type() != DataType::FloatArray {
            return Err(DecoderError::new("raw planner only reads float arrays"));
        }
        let dims = variable.dimensions().to_vec();
        let chunks = variable.chunks().to_vec();
        let grid = chunk_grid(&dims, &chunks);

        let (next_chunk, last_chunk) = if request.dim_read.iter().any(|r| r.start >= r.end) {
            (0, 0)
        } else {
            let first: Vec<u64> = request
                .dim_read
                .iter()
                .zip(&chunks)
                .map(|(r, c)| r.start / c)
                .collect();
            let last: Vec<u64> = request
                .dim_read
                .iter()
                .zip(&chunks)
                .map(|(r, c)| (r.end - 1) / c)
                .collect();
            (linear(&first, &grid), linear(&last, &grid) + 1)
        };

        Ok(RawPlan {
            dims,
            chunks,
            grid,
            read: request.dim_read.clone(),
            cube_offset: request.into_cube_offset.clone(),
            cube_dims: request.into_cube_dimension.clone(),
            lut_offset: variable.lut_offset(),
            data_start: self.data_start,
            io_size_merge: request.io.io_size_merge,
            io_size_max: request.io.io_size_max,
            next_chunk,
            last_chunk,
            cursor: 0,
            bounds: Vec::new(),
        })
    }
}

pub struct RawPlan {
    dims: Vec<u64>,
    chunks: Vec<u64>,
    grid: Vec<u64>,
    read: Vec<Range<u64>>,
    cube_offset: Vec<u64>,
    cube_dims: Vec<u64>,
    lut_offset: u64,
    data_start: u64,
    io_size_merge: u64,
    io_size_max: u64,
    next_chunk: u64,
    last_chunk: u64,
    cursor: u64,
    /// Byte ranges of each chunk within the current data read
    bounds: Vec<Range<u64>>,
}

impl RawPlan {
    fn needed(&self, chunk: u64) -> bool {
        chunk_coords(chunk, &self.grid)
            .iter()
            .enumerate()
            .all(|(d, &c)| {
                let start = c * self.chunks[d];
                start < self.read[d].end && start + self.chunks[d] > self.read[d].start
            })
    }
}

fn corrupt(what: &str) -> DecoderError {
    DecoderError::new(format!("corrupt chunk index: {what}"))
}

impl DecodePlan for RawPlan {
    type Element = f32;

    fn read_buffer_size(&self) -> u64 {
        self.chunks.iter().product::<u64>() * 4
    }

    fn next_index_read(&mut self) -> Option<IndexRead> {
        if self.next_chunk >= self.last_chunk {
            return None;
        }
        // Each batch also fetches the entry before it, which holds its start
        let max_entries = (self.io_size_max / 8).max(2) - 1;
        let start = self.next_chunk;
        let end = (start + max_entries).min(self.last_chunk);
        let first_entry = start.saturating_sub(1);
        self.next_chunk = end;
        self.cursor = start;
        Some(IndexRead {
            offset: self.lut_offset + first_entry * 8,
            count: (end - first_entry) * 8,
            chunks: start..end,
        })
    }

    fn next_data_read(
        &mut self,
        index_read: &IndexRead,
        index_data: &[u8],
    ) -> Result<Option<DataRead>, DecoderError> {
        let batch = index_read.chunks.clone();
        let first_entry = batch.start.saturating_sub(1);
        if index_data.len() as u64 != (batch.end - first_entry) * 8 {
            return Err(corrupt("index batch has the wrong length"));
        }
        let data_start = self.data_start;
        let end_of = |chunk: u64| {
            let at = ((chunk - first_entry) * 8) as usize;
            u64::from_le_bytes(index_data[at..at + 8].try_into().unwrap())
        };
        let start_of = |chunk: u64| if chunk == 0 { data_start } else { end_of(chunk - 1) };

        let mut chunk = self.cursor.max(batch.start);
        while chunk < batch.end && !self.needed(chunk) {
            chunk += 1;
        }
        if chunk >= batch.end {
            self.cursor = batch.end;
            return Ok(None);
        }

        let first = chunk;
        let offset = start_of(first);
        let mut end = end_of(first);
        let mut last = first + 1;
        if end < offset {
            return Err(corrupt("chunk ends before it starts"));
        }

        // Grow the read over needed chunks, bridging small unneeded gaps
        let mut probe = last;
        while probe < batch.end {
            let probe_end = end_of(probe);
            let Some(span) = probe_end.checked_sub(offset) else {
                return Err(corrupt("offsets go backwards"));
            };
            if span > self.io_size_max {
                break;
            }
            if self.needed(probe) {
                end = probe_end;
                last = probe + 1;
            } else if probe_end.saturating_sub(end) > self.io_size_merge {
                break;
            }
            probe += 1;
        }

        let mut bounds = Vec::with_capacity((last - first) as usize);
        for c in first..last {
            let (s, e) = (start_of(c), end_of(c));
            if s < offset || e < s {
                return Err(corrupt("chunk bounds out of order"));
            }
            bounds.push(s - offset..e - offset);
        }
        self.bounds = bounds;
        self.cursor = last;

        Ok(Some(DataRead {
            offset,
            count: end - offset,
            chunks: first..last,
        }))
    }

    fn decode_chunks(
        &self,
        chunks: Range<u64>,
        data: &[u8],
        output: &mut [f32],
        scratch: &mut [u8],
    ) -> Result<(), DecoderError> {
        if (chunks.end - chunks.start) as usize != self.bounds.len() {
            return Err(DecoderError::new("data read does not match the planned chunks"));
        }
        for (i, chunk) in chunks.enumerate() {
            if !self.needed(chunk) {
                continue;
            }
            let range = &self.bounds[i];
            let bytes = data
                .get(range.start as usize..range.end as usize)
                .ok_or_else(|| DecoderError::new(format!("chunk {chunk} exceeds the data read")))?;
            let extent = chunk_extent(&chunk_coords(chunk, &self.grid), &self.dims, &self.chunks);
            let count: u64 = extent.iter().map(|r| r.end - r.start).product();
            if bytes.len() as u64 != count * 4 {
                return Err(DecoderError::new(format!(
                    "chunk {chunk} holds {} bytes, expected {}",
                    bytes.len(),
                    count * 4
                )));
            }
            scratch[..bytes.len()].copy_from_slice(bytes);

            let mut element = 0usize;
            for_each_position(&extent, |pos| {
                let at = element * 4;
                element += 1;
                let inside = pos
                    .iter()
                    .zip(&self.read)
                    .all(|(p, r)| r.start <= *p && *p < r.end);
                if !inside {
                    return;
                }
                let cube_pos: Vec<u64> = pos
                    .iter()
                    .enumerate()
                    .map(|(d, p)| p - self.read[d].start + self.cube_offset[d])
                    .collect();
                let value = f32::from_le_bytes(scratch[at..at + 4].try_into().unwrap());
                if let Some(slot) = output.get_mut(linear(&cube_pos, &self.cube_dims) as usize) {
                    *slot = value;
                }
            });
        }
        Ok(())
    }
}

/// Backend wrapper that logs fetches and can fail the Nth one
#[derive(Debug)]
pub struct CountingBackend<B> {
    inner: B,
    calls: AtomicUsize,
    fail_on: Option<usize>,
    log: Mutex<Vec<(u64, u64)>>,
}

impl<B: Backend> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_on: None,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Fail the `n`th fetch (1-based)
    pub fn failing_on(inner: B, n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::new(inner)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<(u64, u64)> {
        self.log.lock().clone()
    }
}

impl<B: Backend> Backend for CountingBackend<B> {
    fn total_size(&self) -> u64 {
        self.inner.total_size()
    }

    fn fetch(&self, offset: u64, length: u64) -> cubefile::Result<Bytes> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(call) {
            return Err(CubeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected failure",
            )));
        }
        self.log.lock().push((offset, length));
        self.inner.fetch(offset, length)
    }
}
