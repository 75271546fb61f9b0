//! NDR error types

use thiserror::Error;

/// Upper bound on any single conformant allocation read off the wire.
pub const MAX_NDR_ALLOCATION_SIZE: usize = 16 * 1024 * 1024;

/// NDR encoding/decoding errors
#[derive(Debug, Error)]
pub enum NdrError {
    /// Not enough data left in the stub
    #[error("buffer underflow: needed {needed} bytes, have {have}")]
    BufferUnderflow { needed: usize, have: usize },

    /// Malformed string header or payload
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// A referent id that the decoder cannot accept
    #[error("invalid pointer: referent ID {0:#x}")]
    InvalidPointer(u32),

    #[error("conformance mismatch: max_count={max_count}, actual_count={actual_count}")]
    ConformanceMismatch { max_count: u32, actual_count: u32 },

    /// Conformance larger than the decoder is willing to allocate
    #[error("allocation of {requested} exceeds limit {limit}")]
    AllocationLimitExceeded { requested: usize, limit: usize },

    #[error("integer overflow while sizing NDR data")]
    IntegerOverflow,

    /// Bytes left over after the last expected value
    #[error("{0} trailing bytes after stub data")]
    TrailingData(usize),

    #[error("UTF-16 error: {0}")]
    Utf16Error(#[from] std::char::DecodeUtf16Error),
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
