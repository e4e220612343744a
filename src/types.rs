//! Core data types for cube files

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data types stored in a variable, using the on-disk type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    None = 0,
    Int8 = 1,
    Uint8 = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Int64 = 7,
    Uint64 = 8,
    Float = 9,
    Double = 10,
    String = 11,
    Int8Array = 12,
    Uint8Array = 13,
    Int16Array = 14,
    Uint16Array = 15,
    Int32Array = 16,
    Uint32Array = 17,
    Int64Array = 18,
    Uint64Array = 19,
    FloatArray = 20,
    DoubleArray = 21,
    StringArray = 22,
}

impl DataType {
    /// Get the type from its on-disk code
    pub fn from_u8(value: u8) -> Option<Self> {
        use DataType::*;
        let data_type = match value {
            0 => None,
            1 => Int8,
            2 => Uint8,
            3 => Int16,
            4 => Uint16,
            5 => Int32,
            6 => Uint32,
            7 => Int64,
            8 => Uint64,
            9 => Float,
            10 => Double,
            11 => String,
            12 => Int8Array,
            13 => Uint8Array,
            14 => Int16Array,
            15 => Uint16Array,
            16 => Int32Array,
            17 => Uint32Array,
            18 => Int64Array,
            19 => Uint64Array,
            20 => FloatArray,
            21 => DoubleArray,
            22 => StringArray,
            _ => return Option::None,
        };
        Some(data_type)
    }

    /// Whether values of this type are stored as a chunked array
    pub fn is_array(&self) -> bool {
        (*self as u8) >= DataType::Int8Array as u8
    }

    /// Size in bytes of one element, `None` for strings and the empty type
    pub fn element_size(&self) -> Option<usize> {
        use DataType::*;
        match self {
            Int8 | Uint8 | Int8Array | Uint8Array => Some(1),
            Int16 | Uint16 | Int16Array | Uint16Array => Some(2),
            Int32 | Uint32 | Float | Int32Array | Uint32Array | FloatArray => Some(4),
            Int64 | Uint64 | Double | Int64Array | Uint64Array | DoubleArray => Some(8),
            None | String | StringArray => Option::None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Chunk compression schemes, using the on-disk codes
///
/// The codecs themselves live in the decode plan; the reader only reports
/// which one a variable declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    /// Scaled to int16, delta coded in two dimensions, bit packed
    PforDelta2dInt16 = 0,
    /// Floating point XOR coding in two dimensions
    FpxXor2d = 1,
    /// Delta coded in two dimensions, bit packed, native width
    PforDelta2d = 2,
    /// Like `PforDelta2dInt16` after a `log10(1 + x)` transform
    PforDelta2dInt16Logarithmic = 3,
    /// Stored as is
    None = 4,
}

impl CompressionType {
    /// Get the compression from its on-disk code
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::PforDelta2dInt16),
            1 => Some(CompressionType::FpxXor2d),
            2 => Some(CompressionType::PforDelta2d),
            3 => Some(CompressionType::PforDelta2dInt16Logarithmic),
            4 => Some(CompressionType::None),
            _ => None,
        }
    }
}

/// Element types that can receive decoded values
///
/// `DATA_TYPE` is the array type a variable must declare for its values to be
/// read into a slice of `Self`.
pub trait CubeElement: Copy + Default + num_traits::Zero + Send + Sync + 'static {
    const DATA_TYPE: DataType;
}

macro_rules! cube_element {
    ($($ty:ty => $data_type:ident),* $(,)?) => {
        $(
            impl CubeElement for $ty {
                const DATA_TYPE: DataType = DataType::$data_type;
            }
        )*
    };
}

cube_element! {
    i8 => Int8Array,
    u8 => Uint8Array,
    i16 => Int16Array,
    u16 => Uint16Array,
    i32 => Int32Array,
    u32 => Uint32Array,
    i64 => Int64Array,
    u64 => Uint64Array,
    f32 => FloatArray,
    f64 => DoubleArray,
}
