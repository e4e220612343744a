//! Read requests: which sub-range to read and where it lands in the output cube

use crate::error::{CubeError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::warn;

/// Default minimum fetch granularity; smaller adjacent reads are merged
pub const DEFAULT_IO_SIZE_MERGE: u64 = 512;

/// Default upper bound on a single merged fetch
pub const DEFAULT_IO_SIZE_MAX: u64 = 65536;

/// Upper bound on the dimension count of a request
pub const MAX_DIMENSION_COUNT: usize = 1000;

/// IO tuning handed to the decode plan. Zero selects the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoLimits {
    pub io_size_merge: u64,
    pub io_size_max: u64,
}

impl IoLimits {
    /// Limits in bytes; pass 0 for the default
    pub fn new(io_size_merge: u64, io_size_max: u64) -> Self {
        Self {
            io_size_merge,
            io_size_max,
        }
    }

    /// Replace zero fields with the defaults
    pub fn resolved(&self) -> Self {
        Self {
            io_size_merge: if self.io_size_merge == 0 {
                DEFAULT_IO_SIZE_MERGE
            } else {
                self.io_size_merge
            },
            io_size_max: if self.io_size_max == 0 {
                DEFAULT_IO_SIZE_MAX
            } else {
                self.io_size_max
            },
        }
    }
}

/// A sub-cube to read and its placement in the output cube
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Requested range in each dimension of the variable
    pub dim_read: Vec<Range<u64>>,
    /// Where the first requested element lands in the output cube
    pub into_cube_offset: Vec<u64>,
    /// Shape of the output cube
    pub into_cube_dimension: Vec<u64>,
    #[serde(default)]
    pub io: IoLimits,
}

impl ReadRequest {
    /// Read `dim_read` into a cube of exactly its own shape
    pub fn new(dim_read: Vec<Range<u64>>) -> Self {
        let into_cube_dimension = dim_read.iter().map(|r| r.end.saturating_sub(r.start)).collect();
        Self {
            into_cube_offset: vec![0; dim_read.len()],
            into_cube_dimension,
            dim_read,
            io: IoLimits::default(),
        }
    }

    /// Place the read at `offset` inside a cube of shape `dimension`
    pub fn into_cube(mut self, offset: Vec<u64>, dimension: Vec<u64>) -> Self {
        self.into_cube_offset = offset;
        self.into_cube_dimension = dimension;
        self
    }

    /// Replace the IO tuning
    pub fn with_io_limits(mut self, io: IoLimits) -> Self {
        self.io = io;
        self
    }

    /// Number of dimensions the request covers
    pub fn dimension_count(&self) -> usize {
        self.dim_read.len()
    }

    /// Number of elements requested in each dimension, zero for reversed ranges
    pub fn read_count(&self) -> Vec<u64> {
        self.dim_read
            .iter()
            .map(|r| r.end.saturating_sub(r.start))
            .collect()
    }

    /// Number of elements in the output cube
    pub fn cube_len(&self) -> Option<u64> {
        self.into_cube_dimension
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    /// Copy of the request with IO limits defaulted
    pub fn resolved(&self) -> Self {
        Self {
            io: self.io.resolved(),
            ..self.clone()
        }
    }

    /// Check internal consistency and bounds against a variable's extent
    pub fn validate(&self, dimensions: &[u64]) -> Result<()> {
        let count = self.dimension_count();
        if count > MAX_DIMENSION_COUNT {
            warn!(count, "rejecting suspicious dimension count");
            return Err(CubeError::InvalidArgument(format!(
                "dimension count {} exceeds {}",
                count, MAX_DIMENSION_COUNT
            )));
        }
        if self.into_cube_offset.len() != count || self.into_cube_dimension.len() != count {
            return Err(CubeError::InvalidArgument(format!(
                "request has {} ranges, {} cube offsets and {} cube dimensions",
                count,
                self.into_cube_offset.len(),
                self.into_cube_dimension.len()
            )));
        }
        if dimensions.len() != count {
            return Err(CubeError::InvalidArgument(format!(
                "request has {} dimensions, variable has {}",
                count,
                dimensions.len()
            )));
        }

        for (i, range) in self.dim_read.iter().enumerate() {
            if range.start > range.end || range.end > dimensions[i] {
                return Err(CubeError::InvalidArgument(format!(
                    "range {:?} in dimension {} is outside 0..{}",
                    range, i, dimensions[i]
                )));
            }
            let end_in_cube = self.into_cube_offset[i].checked_add(range.end - range.start);
            if end_in_cube.map_or(true, |end| end > self.into_cube_dimension[i]) {
                return Err(CubeError::InvalidArgument(format!(
                    "{} elements at cube offset {} overflow cube dimension {} in dimension {}",
                    range.end - range.start,
                    self.into_cube_offset[i],
                    self.into_cube_dimension[i],
                    i
                )));
            }
        }
        Ok(())
    }
}
