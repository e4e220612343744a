//! Reader - main API for opening cube files and decoding sub-cubes

use crate::backend::{fetch_exact, Backend};
use crate::error::{CubeError, Result};
use crate::header::{locate, HeaderKind, Located};
use crate::plan::{DecodePlan, ElementOf, Planner};
use crate::request::{IoLimits, ReadRequest};
use crate::types::CubeElement;
use crate::utils::{format_bytes, try_alloc_zeroed};
use crate::variable::{Layout, Variable};
use bytes::Bytes;
use ndarray::{ArrayD, IxDyn};
use num_traits::Zero;
use std::ops::Range;
use tracing::{debug, trace};

/// Open handle on a cube file
///
/// Owns the root variable's metadata and the backend handle it was opened
/// with. Everything is read-only after [`Reader::open`], so a `&Reader` can
/// serve concurrent reads when the backend allows it.
#[derive(Debug)]
pub struct Reader<B> {
    backend: B,
    metadata: Bytes,
    kind: HeaderKind,
    layout: Layout,
}

impl<B: Backend> Reader<B> {
    /// Open a cube file, resolving its root variable
    pub fn open(backend: B) -> Result<Self> {
        let total_size = backend.total_size();
        if total_size == 0 {
            return Err(CubeError::InvalidArgument(
                "backend reports an empty source".to_string(),
            ));
        }

        let Located { kind, metadata } = locate(&backend)?;
        let layout = Variable::parse(kind, &metadata)?.into_layout();

        debug!(
            ?kind,
            metadata = %format_bytes(metadata.len() as u64),
            total = %format_bytes(total_size),
            "opened cube file"
        );

        Ok(Self {
            backend,
            metadata,
            kind,
            layout,
        })
    }

    /// Release the metadata and hand the backend back to the caller
    pub fn close(self) -> B {
        self.backend
    }

    /// View of the root variable
    pub fn variable(&self) -> Variable<'_> {
        Variable::from_layout(&self.metadata, self.layout.clone())
    }

    /// Layout detected from the header at open time
    pub fn header_kind(&self) -> HeaderKind {
        self.kind
    }

    /// Serialized metadata of the root variable
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// The backend this reader fetches from
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Size of the file in bytes, as reported by the backend
    pub fn total_size(&self) -> u64 {
        self.backend.total_size()
    }

    /// Drain `plan`, fetching what it asks for and decoding into `output`
    ///
    /// `scratch` must hold at least `plan.read_buffer_size()` bytes. On error
    /// the contents of `output` are unspecified.
    pub fn decode<P: DecodePlan>(
        &self,
        plan: &mut P,
        output: &mut [P::Element],
        scratch: &mut [u8],
    ) -> Result<()> {
        if output.is_empty() {
            return Err(CubeError::InvalidArgument("output is empty".to_string()));
        }
        let needed = plan.read_buffer_size();
        if (scratch.len() as u64) < needed {
            return Err(CubeError::InvalidArgument(format!(
                "scratch holds {} bytes, plan needs {}",
                scratch.len(),
                needed
            )));
        }

        let mut index_reads = 0u64;
        let mut data_reads = 0u64;
        while let Some(index_read) = plan.next_index_read() {
            trace!(
                offset = index_read.offset,
                count = index_read.count,
                chunks = ?index_read.chunks,
                "fetching chunk index"
            );
            let index_data = fetch_exact(&self.backend, index_read.offset, index_read.count)?;
            index_reads += 1;

            while let Some(data_read) = plan.next_data_read(&index_read, &index_data)? {
                trace!(
                    offset = data_read.offset,
                    count = data_read.count,
                    chunks = ?data_read.chunks,
                    "fetching chunk data"
                );
                let data = fetch_exact(&self.backend, data_read.offset, data_read.count)?;
                data_reads += 1;
                plan.decode_chunks(data_read.chunks, &data, output, scratch)?;
            }
        }

        debug!(index_reads, data_reads, "decode complete");
        Ok(())
    }

    /// Read `request` into `output` with a plan built by `planner`
    ///
    /// Validates the request against the variable, defaults zero IO limits,
    /// and allocates the scratch buffer the plan asks for.
    pub fn read<P: Planner>(
        &self,
        planner: &P,
        request: &ReadRequest,
        output: &mut [ElementOf<P>],
    ) -> Result<()> {
        let variable = self.variable();

        let element_type = <ElementOf<P> as CubeElement>::DATA_TYPE;
        if variable.data_type() != element_type {
            return Err(CubeError::DataTypeMismatch {
                expected: variable.data_type(),
                actual: element_type,
            });
        }

        request.validate(&variable.dimensions().to_vec())?;
        let cube_len = request.cube_len().ok_or_else(|| {
            CubeError::InvalidArgument("output cube size overflows".to_string())
        })?;
        if (output.len() as u64) < cube_len {
            return Err(CubeError::InvalidArgument(format!(
                "output holds {} elements, cube needs {}",
                output.len(),
                cube_len
            )));
        }

        let request = request.resolved();
        debug!(
            ranges = ?request.dim_read,
            cube_offset = ?request.into_cube_offset,
            cube_dimension = ?request.into_cube_dimension,
            io_size_merge = request.io.io_size_merge,
            io_size_max = request.io.io_size_max,
            "planning read"
        );

        let mut plan = planner.plan(&variable, &request)?;
        let mut scratch = try_alloc_zeroed(plan.read_buffer_size())?;
        self.decode(&mut plan, output, &mut scratch)
    }

    /// Read `dim_read` into a freshly allocated array of the requested shape
    pub fn read_array<P: Planner>(
        &self,
        planner: &P,
        dim_read: Vec<Range<u64>>,
        io: IoLimits,
    ) -> Result<ArrayD<ElementOf<P>>> {
        let request = ReadRequest::new(dim_read).with_io_limits(io);
        request.validate(&self.variable().dimensions().to_vec())?;

        let shape = request
            .into_cube_dimension
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| CubeError::InvalidArgument("shape exceeds address space".to_string()))?;
        let len = request
            .cube_len()
            .ok_or_else(|| CubeError::InvalidArgument("shape overflows".to_string()))?;

        let mut data = alloc_elements::<ElementOf<P>>(len)?;
        if len > 0 {
            self.read(planner, &request, &mut data)?;
        }
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| CubeError::InvalidArgument(e.to_string()))
    }
}

#[cfg(feature = "async")]
impl<B> Reader<B>
where
    B: Backend + Send + Sync + 'static,
{
    /// [`Reader::read_array`] on tokio's blocking pool
    pub async fn read_array_async<P>(
        self: std::sync::Arc<Self>,
        planner: P,
        dim_read: Vec<Range<u64>>,
        io: IoLimits,
    ) -> Result<ArrayD<ElementOf<P>>>
    where
        P: Planner + Send + 'static,
    {
        tokio::task::spawn_blocking(move || self.read_array(&planner, dim_read, io))
            .await
            .map_err(|e| CubeError::Io(std::io::Error::other(e)))?
    }
}

fn alloc_elements<T: CubeElement>(len: u64) -> Result<Vec<T>> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>() as u64);
    let count = usize::try_from(len).map_err(|_| CubeError::OutOfMemory(bytes))?;
    if bytes > isize::MAX as u64 {
        return Err(CubeError::OutOfMemory(bytes));
    }
    let mut data = Vec::new();
    data.try_reserve_exact(count)
        .map_err(|_| CubeError::OutOfMemory(bytes))?;
    data.resize(count, T::zero());
    Ok(data)
}
