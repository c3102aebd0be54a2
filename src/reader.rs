//! Reader side of the tee
//!
//! A `TeeReader` drains its own bounded queue independently of every other
//! reader. Reads reassemble whole chunks into a caller-paced byte stream:
//! bytes the caller's buffer cannot hold stay pending for the next call, and
//! a reader that finds its queue empty can coalesce a low-water burst of
//! chunks before waking. A reader that falls far enough behind sacrifices
//! its entire queued backlog to catch up, bounding staleness to the arrival
//! of the next broadcast.

use std::sync::{Arc, Weak};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::broadcaster::TeeInner;
use crate::error::{Result, TeeError};
use crate::queue::ChunkQueue;
use crate::stats::ReaderStats;

/// Sticky terminal condition of a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Eof,
    Cancelled,
}

/// Outcome of one wait inside the fill loop
enum Wait {
    Chunk(Bytes),
    Eos,
    Cancelled,
}

/// Independent consumer handle created by [`Tee::subscribe`](crate::Tee::subscribe)
///
/// The bytes observed across all reads form an order-preserving subsequence
/// of the chunks broadcast while the reader was registered, with whole
/// chunks (never fragments of one) missing wherever the reader fell behind.
pub struct TeeReader {
    id: u64,
    queue: Arc<ChunkQueue>,
    tee: Weak<TeeInner>,
    token: Option<CancellationToken>,
    lowwater: usize,
    pending: Bytes,
    accumulator: BytesMut,
    terminal: Option<Terminal>,
}

impl TeeReader {
    pub(crate) fn new(
        id: u64,
        queue: Arc<ChunkQueue>,
        tee: Weak<TeeInner>,
        token: Option<CancellationToken>,
        lowwater: usize,
    ) -> Self {
        Self {
            id,
            queue,
            tee,
            token,
            lowwater,
            pending: Bytes::new(),
            accumulator: BytesMut::new(),
            terminal: None,
        }
    }

    /// Read the next bytes of the stream into `buf`
    ///
    /// Returns pending bytes immediately if any are held over from a
    /// previous call; otherwise waits for the next chunk (or low-water
    /// burst) and returns as much of it as fits, keeping the rest pending.
    /// End-of-stream is a zero-length read once buffered data is exhausted.
    /// Cancellation surfaces as [`TeeError::Cancelled`], also only after
    /// already-accumulated bytes have been returned; both conditions are
    /// sticky across subsequent calls.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending.is_empty() {
            self.fill().await;
        }
        if self.pending.is_empty() {
            return match self.terminal {
                Some(Terminal::Cancelled) => Err(TeeError::Cancelled),
                _ => Ok(0),
            };
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    /// Forward the rest of the stream into `sink`
    ///
    /// Runs until end-of-stream (returning the byte count), cancellation,
    /// or the first sink failure, which is surfaced verbatim without
    /// waiting for end-of-stream. The reader is closed on every exit path.
    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let result = self.pump(sink).await;
        self.close();
        result
    }

    async fn pump<W>(&mut self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written: u64 = 0;
        loop {
            if self.pending.is_empty() {
                self.fill().await;
            }
            if self.pending.is_empty() {
                match self.terminal {
                    Some(Terminal::Eof) => return Ok(written),
                    Some(Terminal::Cancelled) => return Err(TeeError::Cancelled),
                    // A zero-length chunk was delivered; nothing to forward.
                    None => continue,
                }
            }
            while !self.pending.is_empty() {
                let n = sink.write(&self.pending).await.map_err(TeeError::Sink)?;
                if n == 0 {
                    return Err(TeeError::Sink(std::io::ErrorKind::WriteZero.into()));
                }
                self.pending.advance(n);
                written += n as u64;
            }
        }
    }

    /// Refill `pending` from the queue
    ///
    /// Target is one chunk, or `lowwater` chunks when the queue is empty at
    /// entry, so a reader that is already waiting amortizes wakeups over a
    /// small burst. Each wait is a three-way race between the next chunk,
    /// end-of-stream, and cancellation; a terminal condition ends the loop
    /// early, keeping whatever was accumulated. Afterwards, a queue still at
    /// or next to capacity has its whole backlog discarded.
    async fn fill(&mut self) {
        if self.terminal.is_some() {
            return;
        }

        let mut target = 1;
        if self.lowwater > 1 && self.queue.is_empty() {
            target = self.lowwater;
        }

        self.accumulator.clear();
        for _ in 0..target {
            let wait = match &self.token {
                Some(token) => tokio::select! {
                    chunk = self.queue.pop() => match chunk {
                        Some(chunk) => Wait::Chunk(chunk),
                        None => Wait::Eos,
                    },
                    _ = token.cancelled() => Wait::Cancelled,
                },
                None => match self.queue.pop().await {
                    Some(chunk) => Wait::Chunk(chunk),
                    None => Wait::Eos,
                },
            };
            match wait {
                Wait::Chunk(chunk) => self.accumulator.extend_from_slice(&chunk),
                Wait::Eos => {
                    self.terminal = Some(Terminal::Eof);
                    break;
                }
                Wait::Cancelled => {
                    self.terminal = Some(Terminal::Cancelled);
                    break;
                }
            }
        }

        // Near-full heuristic: a reader this far behind gives up the whole
        // backlog rather than draining it chunk by chunk. Only engages above
        // capacity 2.
        if self.queue.capacity() > 2 && self.queue.len() >= self.queue.capacity() - 1 {
            let discarded = self.queue.clear_backlog();
            tracing::debug!(reader = self.id, discarded, "reader fell behind, backlog discarded");
        }

        self.pending = self.accumulator.split().freeze();
    }

    /// Stop receiving and deregister from the tee
    ///
    /// Wakes a concurrently blocked read with end-of-stream (not
    /// cancellation). Chunks already queued or accumulated stay readable.
    /// Idempotent; a reader the tee has already released only closes its own
    /// queue.
    pub fn close(&self) {
        if let Some(tee) = self.tee.upgrade() {
            if tee.deregister(self.id) {
                tracing::debug!(reader = self.id, "reader closed");
            }
        }
        self.queue.close();
    }

    /// Snapshot of this reader's delivery counters
    pub fn stats(&self) -> ReaderStats {
        self.queue.stats()
    }
}

impl Drop for TeeReader {
    fn drop(&mut self) {
        self.close();
    }
}
