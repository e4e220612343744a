//! Interface to the decode planner
//!
//! The planner knows the chunk index layout, the codec and how chunks map onto
//! the output cube. The reader only moves the bytes a plan asks for: it fetches
//! each [`IndexRead`], feeds the index bytes back to the plan to obtain
//! [`DataRead`]s, fetches those and hands them to [`DecodePlan::decode_chunks`].

use crate::error::DecoderError;
use crate::request::ReadRequest;
use crate::types::CubeElement;
use crate::variable::Variable;
use std::ops::Range;

/// A region of the chunk index to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRead {
    /// File offset of the first index byte
    pub offset: u64,
    /// Number of index bytes
    pub count: u64,
    /// Chunks whose index entries this read covers
    pub chunks: Range<u64>,
}

/// A region of compressed chunk payload to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRead {
    /// File offset of the first payload byte
    pub offset: u64,
    /// Number of payload bytes
    pub count: u64,
    /// Chunks stored back to back in this region
    pub chunks: Range<u64>,
}

/// A configured, stateful read plan for one request
///
/// Plans are drained by [`crate::Reader::decode`]. Both `next_*` calls
/// advance internal cursors; `decode_chunks` must not rely on the contents of
/// `scratch` left by a previous call.
pub trait DecodePlan {
    /// Element type written into the output cube
    type Element: CubeElement;

    /// Minimum scratch size in bytes for decoding one chunk
    fn read_buffer_size(&self) -> u64;

    /// Next batch of index entries to fetch, `None` when the plan is done
    fn next_index_read(&mut self) -> Option<IndexRead>;

    /// Next payload region covered by the index bytes just fetched, `None`
    /// once the batch is exhausted
    fn next_data_read(
        &mut self,
        index_read: &IndexRead,
        index_data: &[u8],
    ) -> Result<Option<DataRead>, DecoderError>;

    /// Decode the chunks contained in `data` into `output`
    fn decode_chunks(
        &self,
        chunks: Range<u64>,
        data: &[u8],
        output: &mut [Self::Element],
        scratch: &mut [u8],
    ) -> Result<(), DecoderError>;
}

/// Builds decode plans for a variable
pub trait Planner {
    type Plan: DecodePlan;

    /// Configure a plan for `request`. IO limits arrive already defaulted.
    fn plan(
        &self,
        variable: &Variable<'_>,
        request: &ReadRequest,
    ) -> Result<Self::Plan, DecoderError>;
}

impl<P: Planner + ?Sized> Planner for &P {
    type Plan = P::Plan;

    fn plan(
        &self,
        variable: &Variable<'_>,
        request: &ReadRequest,
    ) -> Result<Self::Plan, DecoderError> {
        (**self).plan(variable, request)
    }
}

/// Element type produced by a planner's plans
pub type ElementOf<P> = <<P as Planner>::Plan as DecodePlan>::Element;
