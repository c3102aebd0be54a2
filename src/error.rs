//! Error types for tee readers
//!
//! Reads produce exactly two terminal conditions: end-of-stream, reported as
//! a zero-length read once buffered data is exhausted, and cancellation,
//! reported as [`TeeError::Cancelled`]. Sink failures from
//! [`write_to`](crate::TeeReader::write_to) are passed through verbatim.

use std::io;

/// Convenience alias for reader operations
pub type Result<T> = std::result::Result<T, TeeError>;

/// Error type for reader operations
#[derive(Debug)]
pub enum TeeError {
    /// The reader's cancellation token fired before end-of-stream
    Cancelled,
    /// The downstream sink failed while being driven by `write_to`
    Sink(io::Error),
}

impl std::fmt::Display for TeeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeeError::Cancelled => write!(f, "read cancelled"),
            TeeError::Sink(e) => write!(f, "sink write failed: {}", e),
        }
    }
}

impl std::error::Error for TeeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TeeError::Sink(e) => Some(e),
            TeeError::Cancelled => None,
        }
    }
}
