//! cubefile - streaming reader for chunked cube files
//!
//! Cube files store large multi-dimensional numeric arrays (gridded weather
//! and climate data, for example) split into individually compressed chunks,
//! with a chunk index (LUT) mapping each chunk to its bytes.
//!
//! # Features
//!
//! - Both on-disk layouts: legacy files whose header is the metadata, and
//!   current files whose trailer points at it
//! - Pluggable byte-range backends (memory, files, host callbacks)
//! - Two-phase streaming decode: index reads, then merged data reads
//! - Decoded values written straight into a caller-provided output cube
//!
//! The codec and chunk geometry live in a [`plan::Planner`] supplied by the
//! caller; this crate moves bytes between the backend and the plan.
//!
//! # Example
//!
//! ```rust,ignore
//! use cubefile::{FileBackend, IoLimits, Reader};
//!
//! # fn example(planner: impl cubefile::Planner) -> cubefile::Result<()> {
//! let reader = Reader::open(FileBackend::open("temperature_2m.om")?)?;
//! println!("dimensions: {:?}", reader.variable().dimensions().to_vec());
//!
//! // First two rows, all columns
//! let rows = reader.read_array(&planner, vec![0..2, 0..1440], IoLimits::default())?;
//! println!("read {} values", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod header;
pub mod plan;
pub mod reader;
pub mod request;
pub mod types;
pub mod utils;
pub mod variable;

// Re-exports
pub use backend::{Backend, CallbackBackend, FileBackend, MemoryBackend, ReadSeekBackend};
pub use error::{CubeError, DecoderError, Result};
pub use header::{HeaderKind, Trailer, HEADER_SIZE, TRAILER_SIZE};
pub use plan::{DataRead, DecodePlan, ElementOf, IndexRead, Planner};
pub use reader::Reader;
pub use request::{
    IoLimits, ReadRequest, DEFAULT_IO_SIZE_MAX, DEFAULT_IO_SIZE_MERGE, MAX_DIMENSION_COUNT,
};
pub use types::{CompressionType, CubeElement, DataType};
pub use variable::{ChildPointer, U64s, Variable};

/// Version of this crate
pub const CUBEFILE_VERSION: &str = env!("CARGO_PKG_VERSION");
