//! Read-only view over serialized variable metadata
//!
//! A [`Variable`] borrows the metadata buffer owned by the reader and decodes
//! fields on access. Parsing only validates that every field fits in the
//! buffer; nothing is copied.

use crate::error::{CubeError, Result};
use crate::header::{HeaderKind, HEADER_SIZE};
use crate::types::{CompressionType, DataType};
use crate::utils::{le_f32, le_u16, le_u32, le_u64};
use std::ops::Range;

/// Fixed part of a current-layout variable
const BASE_SIZE: usize = 8;

/// Fixed part of a current-layout array variable
const ARRAY_BASE_SIZE: usize = 40;

/// Location of a child variable's metadata within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildPointer {
    pub offset: u64,
    pub size: u64,
}

/// A run of little-endian `u64` values inside the metadata buffer
#[derive(Debug, Clone, Copy)]
pub struct U64s<'a> {
    bytes: &'a [u8],
}

impl<'a> U64s<'a> {
    /// Number of values
    pub fn len(&self) -> usize {
        self.bytes.len() / 8
    }

    /// Whether the run holds no values
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Value at `index`, `None` past the end
    pub fn get(&self, index: usize) -> Option<u64> {
        (index < self.len()).then(|| le_u64(self.bytes, index * 8))
    }

    /// Values in storage order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = u64> + 'a {
        self.bytes.chunks_exact(8).map(|c| le_u64(c, 0))
    }

    /// Copy the values out of the metadata buffer
    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Layout {
    Legacy {
        compression: CompressionType,
    },
    Current {
        data_type: DataType,
        compression: CompressionType,
        dimension_count: usize,
        children: usize,
        children_at: usize,
        value: Range<usize>,
        name: Range<usize>,
    },
}

/// Structured view of one variable's metadata
#[derive(Debug, Clone)]
pub struct Variable<'a> {
    bytes: &'a [u8],
    layout: Layout,
}

impl<'a> Variable<'a> {
    /// Parse `bytes` as laid out by a file of the given kind
    pub fn parse(kind: HeaderKind, bytes: &'a [u8]) -> Result<Self> {
        let layout = match kind {
            HeaderKind::Legacy => parse_legacy(bytes)?,
            HeaderKind::TrailerPointer => parse_current(bytes)?,
            HeaderKind::Invalid => {
                return Err(CubeError::NotAFormatFile(
                    "no variable in an invalid file".to_string(),
                ))
            }
        };
        let variable = Self { bytes, layout };
        variable.check_chunks()?;
        Ok(variable)
    }

    /// Rebuild a view from a layout produced by [`Variable::parse`] on `bytes`
    pub(crate) fn from_layout(bytes: &'a [u8], layout: Layout) -> Self {
        Self { bytes, layout }
    }

    pub(crate) fn into_layout(self) -> Layout {
        self.layout
    }

    /// Whether this variable comes from a legacy header
    pub fn is_legacy(&self) -> bool {
        matches!(self.layout, Layout::Legacy { .. })
    }

    /// The metadata bytes backing this view
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Stored type; legacy files always hold float arrays
    pub fn data_type(&self) -> DataType {
        match &self.layout {
            Layout::Legacy { .. } => DataType::FloatArray,
            Layout::Current { data_type, .. } => *data_type,
        }
    }

    /// Codec the chunks were written with
    pub fn compression(&self) -> CompressionType {
        match &self.layout {
            Layout::Legacy { compression } | Layout::Current { compression, .. } => *compression,
        }
    }

    /// Multiplier applied when values were quantized to integers
    pub fn scale_factor(&self) -> f32 {
        match &self.layout {
            Layout::Legacy { .. } => le_f32(self.bytes, 4),
            Layout::Current { .. } if self.data_type().is_array() => le_f32(self.bytes, 32),
            Layout::Current { .. } => 1.0,
        }
    }

    /// Offset added before quantization
    pub fn add_offset(&self) -> f32 {
        match &self.layout {
            Layout::Current { .. } if self.data_type().is_array() => le_f32(self.bytes, 36),
            _ => 0.0,
        }
    }

    /// Number of dimensions; legacy files are always 2D
    pub fn dimension_count(&self) -> usize {
        match &self.layout {
            Layout::Legacy { .. } => 2,
            Layout::Current {
                dimension_count, ..
            } => *dimension_count,
        }
    }

    /// Full extent of the variable in each dimension
    pub fn dimensions(&self) -> U64s<'a> {
        match &self.layout {
            Layout::Legacy { .. } => self.u64s(8, 2),
            Layout::Current {
                dimension_count: 0,
                ..
            } => self.u64s(0, 0),
            Layout::Current {
                dimension_count, ..
            } => self.u64s(ARRAY_BASE_SIZE, *dimension_count),
        }
    }

    /// Chunk size in each dimension
    pub fn chunks(&self) -> U64s<'a> {
        match &self.layout {
            Layout::Legacy { .. } => self.u64s(24, 2),
            Layout::Current {
                dimension_count: 0,
                ..
            } => self.u64s(0, 0),
            Layout::Current {
                dimension_count, ..
            } => self.u64s(ARRAY_BASE_SIZE + dimension_count * 8, *dimension_count),
        }
    }

    /// Total number of chunks covering the variable
    pub fn number_of_chunks(&self) -> u64 {
        if self.dimension_count() == 0 {
            return 0;
        }
        self.dimensions()
            .iter()
            .zip(self.chunks().iter())
            .map(|(dim, chunk)| dim.div_ceil(chunk))
            .fold(1u64, |acc, n| acc.saturating_mul(n))
    }

    /// File offset of the chunk index
    pub fn lut_offset(&self) -> u64 {
        match &self.layout {
            Layout::Legacy { .. } => HEADER_SIZE,
            Layout::Current { .. } if self.data_type().is_array() => le_u64(self.bytes, 16),
            Layout::Current { .. } => 0,
        }
    }

    /// Size in bytes of the chunk index
    pub fn lut_size(&self) -> u64 {
        match &self.layout {
            Layout::Legacy { .. } => self.number_of_chunks().saturating_mul(8),
            Layout::Current { .. } if self.data_type().is_array() => le_u64(self.bytes, 8),
            Layout::Current { .. } => 0,
        }
    }

    /// Variable name; legacy files carry none
    pub fn name(&self) -> Option<&'a str> {
        match &self.layout {
            Layout::Legacy { .. } => None,
            // Validated as UTF-8 while parsing
            Layout::Current { name, .. } => std::str::from_utf8(&self.bytes[name.clone()]).ok(),
        }
    }

    /// Number of child variables
    pub fn number_of_children(&self) -> usize {
        match &self.layout {
            Layout::Legacy { .. } => 0,
            Layout::Current { children, .. } => *children,
        }
    }

    /// Pointers to child variables, in declaration order
    pub fn children(&self) -> impl ExactSizeIterator<Item = ChildPointer> + 'a {
        let (sizes, offsets) = match &self.layout {
            Layout::Legacy { .. } => (self.u64s(0, 0), self.u64s(0, 0)),
            Layout::Current {
                children,
                children_at,
                ..
            } => (
                self.u64s(*children_at, *children),
                self.u64s(children_at + children * 8, *children),
            ),
        };
        sizes
            .iter()
            .zip(offsets.iter())
            .map(|(size, offset)| ChildPointer { offset, size })
    }

    /// Raw value of a scalar variable, without the length prefix for strings
    pub fn scalar_bytes(&self) -> Option<&'a [u8]> {
        match &self.layout {
            Layout::Current { data_type, value, .. } if !data_type.is_array() => {
                Some(&self.bytes[value.clone()])
            }
            _ => None,
        }
    }

    fn u64s(&self, at: usize, count: usize) -> U64s<'a> {
        U64s {
            bytes: &self.bytes[at..at + count * 8],
        }
    }

    fn check_chunks(&self) -> Result<()> {
        let is_array = self.is_legacy() || self.data_type().is_array();
        if is_array && self.chunks().iter().any(|chunk| chunk == 0) {
            return Err(CubeError::NotAFormatFile(
                "variable declares a zero chunk size".to_string(),
            ));
        }
        Ok(())
    }
}

fn truncated(what: &str) -> CubeError {
    CubeError::NotAFormatFile(format!("variable metadata truncated in {what}"))
}

fn parse_legacy(bytes: &[u8]) -> Result<Layout> {
    if (bytes.len() as u64) < HEADER_SIZE {
        return Err(truncated("legacy header"));
    }
    let compression = match bytes[2] {
        1 => CompressionType::PforDelta2dInt16,
        _ => CompressionType::from_u8(bytes[3]).ok_or_else(|| {
            CubeError::NotAFormatFile(format!("unknown compression code {}", bytes[3]))
        })?,
    };
    Ok(Layout::Legacy { compression })
}

fn parse_current(bytes: &[u8]) -> Result<Layout> {
    if bytes.len() < BASE_SIZE {
        return Err(truncated("variable header"));
    }
    let data_type = DataType::from_u8(bytes[0])
        .ok_or_else(|| CubeError::NotAFormatFile(format!("unknown data type code {}", bytes[0])))?;
    let compression = CompressionType::from_u8(bytes[1]).ok_or_else(|| {
        CubeError::NotAFormatFile(format!("unknown compression code {}", bytes[1]))
    })?;
    let name_len = le_u16(bytes, 2) as usize;
    let children = le_u32(bytes, 4) as usize;

    let (dimension_count, children_at) = if data_type.is_array() {
        if bytes.len() < ARRAY_BASE_SIZE {
            return Err(truncated("array header"));
        }
        let dimension_count = usize::try_from(le_u64(bytes, 24))
            .ok()
            .filter(|n| n.checked_mul(16).is_some_and(|len| len <= bytes.len()))
            .ok_or_else(|| truncated("dimensions"))?;
        (dimension_count, ARRAY_BASE_SIZE + dimension_count * 16)
    } else {
        (0, BASE_SIZE)
    };

    let value_at = children
        .checked_mul(16)
        .and_then(|len| children_at.checked_add(len))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| truncated("children"))?;

    let value = if data_type.is_array() {
        value_at..value_at
    } else {
        scalar_range(data_type, bytes, value_at)?
    };

    let name = value.end..value.end + name_len;
    if name.end > bytes.len() {
        return Err(truncated("name"));
    }
    if std::str::from_utf8(&bytes[name.clone()]).is_err() {
        return Err(CubeError::NotAFormatFile(
            "variable name is not valid UTF-8".to_string(),
        ));
    }

    Ok(Layout::Current {
        data_type,
        compression,
        dimension_count,
        children,
        children_at,
        value,
        name,
    })
}

fn scalar_range(data_type: DataType, bytes: &[u8], at: usize) -> Result<Range<usize>> {
    let range = match data_type {
        DataType::None => at..at,
        DataType::String => {
            if at + 8 > bytes.len() {
                return Err(truncated("string length"));
            }
            let len = usize::try_from(le_u64(bytes, at)).map_err(|_| truncated("string"))?;
            let start = at + 8;
            let end = start.checked_add(len).ok_or_else(|| truncated("string"))?;
            start..end
        }
        other => {
            // Every non-array type besides None and String has a fixed width
            let size = other.element_size().unwrap_or(0);
            at..at + size
        }
    };
    if range.end > bytes.len() {
        return Err(truncated("scalar value"));
    }
    Ok(range)
}
