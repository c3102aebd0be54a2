//! Delivery statistics
//!
//! Cheap snapshot types for observing how lossy a tee has been. The counters
//! themselves live as relaxed atomics next to the state they count; these
//! structs are point-in-time copies.

/// Totals for one tee
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeeStats {
    /// Chunks accepted by `broadcast`
    pub chunks_broadcast: u64,
    /// Bytes accepted by `broadcast`
    pub bytes_broadcast: u64,
    /// Currently registered readers
    pub readers: usize,
}

/// Per-reader delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Chunks dequeued by the reader
    pub delivered: u64,
    /// Chunks that never entered the queue because it was full
    pub dropped: u64,
    /// Queued chunks discarded by a catch-up drop
    pub discarded: u64,
}

impl ReaderStats {
    /// Total chunks this reader missed, for either reason
    pub fn lost(&self) -> u64 {
        self.dropped + self.discarded
    }
}
