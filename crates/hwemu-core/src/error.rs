//! Error type returned by registry and emulator operations.

use thiserror::Error;

use crate::codec::CodecError;

/// Failure of a registry, pair store or emulator operation.
///
/// Every variant has a small stable numeric [`code`](CoreError::code) taken
/// from the matching POSIX errno, which text front ends report alongside the
/// message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// No live device or pair with this identity.
    #[error("{0} not found")]
    NotFound(String),

    /// The index lies outside `[0, max)`.
    #[error("index {index} out of range (max {max})")]
    OutOfRange { index: usize, max: usize },

    /// Every index of the pool is in use.
    #[error("no free slot (limit {max})")]
    OutOfCapacity { max: usize },

    #[error("out of memory")]
    OutOfMemory,

    /// A synchronous pair with the same request already exists on the device.
    #[error("request already mapped by pair {existing}")]
    Duplicate { existing: usize },

    /// The pair text could not be parsed.
    #[error("{0}")]
    Malformed(#[from] CodecError),

    /// The registry lock was held elsewhere.  Only used by the scheduler.
    #[error("interface busy")]
    Busy,

    /// The protocol adapter could not create its backing implementation.
    #[error("adapter failure: {0}")]
    AdapterFailure(String),
}

impl CoreError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            CoreError::NotFound(_) => 2,
            CoreError::AdapterFailure(_) => 5,
            CoreError::OutOfMemory => 12,
            CoreError::Busy => 16,
            CoreError::Duplicate { .. } => 17,
            CoreError::Malformed(_) => 22,
            CoreError::OutOfCapacity { .. } => 28,
            CoreError::OutOfRange { .. } => 34,
        }
    }
}
