//! Error types for cube file operations

use crate::types::DataType;
use thiserror::Error;

/// Main error type for cube file operations
#[derive(Error, Debug)]
pub enum CubeError {
    #[error("Out of memory: failed to allocate {0} bytes")]
    OutOfMemory(u64),

    #[error("Not a cube file: {0}")]
    NotAFormatFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Data type mismatch: variable stores {expected}, output is {actual}")]
    DataTypeMismatch { expected: DataType, actual: DataType },
}

impl CubeError {
    /// Shorthand for an `Io` error describing a range the source cannot serve.
    pub(crate) fn out_of_range(offset: u64, length: u64, total_size: u64) -> Self {
        CubeError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "range {}..{} exceeds source size {}",
                offset,
                offset.saturating_add(length),
                total_size
            ),
        ))
    }
}

/// Failure reported by a decode plan.
///
/// Plans are supplied by callers, so the message is free-form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DecoderError(String);

impl DecoderError {
    /// Wrap a plan's failure message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The plan's failure message
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Specialized Result type for cube file operations
pub type Result<T> = std::result::Result<T, CubeError>;
