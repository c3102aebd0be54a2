//! Broadcaster side of the tee
//!
//! The `Tee` owns the registry of active readers and fans every broadcast
//! chunk out to each of their queues without ever blocking on a slow
//! consumer.
//!
//! # Architecture
//!
//! ```text
//!                           Tee (producer side)
//!                    ┌────────────────────────────────┐
//!     broadcast() ──►│ registry: Mutex<HashMap<u64,   │
//!     close()        │     Arc<ChunkQueue>>>          │
//!                    └───────────────┬────────────────┘
//!                                    │ try_push (never blocks,
//!                                    │ drops on a full queue)
//!             ┌──────────────────────┼──────────────────────┐
//!             ▼                      ▼                      ▼
//!       [ChunkQueue]          [ChunkQueue]           [ChunkQueue]
//!             │                      │                      │
//!      TeeReader::read()      TeeReader::read()     TeeReader::write_to()
//! ```
//!
//! # Zero-Copy Fan-Out
//!
//! `broadcast` takes one defensive copy of the caller's bytes into a
//! [`bytes::Bytes`] and hands the reference-counted handle to every queue,
//! so the chunk data is allocated once no matter how many readers are
//! registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::queue::ChunkQueue;
use crate::reader::TeeReader;
use crate::stats::TeeStats;

/// One-to-any lossy broadcast pipe
///
/// Readers can be added at any time and each receives a copy of every chunk
/// broadcast after its registration, at its own pace. A reader that is not
/// keeping up misses chunks instead of slowing the producer or its peers.
///
/// Cloning a `Tee` yields another handle to the same pipe.
#[derive(Clone, Default)]
pub struct Tee {
    inner: Arc<TeeInner>,
}

pub(crate) struct TeeInner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    chunks: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Default)]
struct Registry {
    readers: HashMap<u64, Arc<ChunkQueue>>,
    closed: bool,
}

impl Default for TeeInner {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }
}

impl Tee {
    /// Create a new tee with no readers
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a chunk to every registered reader that has queue space
    ///
    /// The input is copied once, so the caller may reuse its buffer
    /// immediately. A reader whose queue is full at this instant misses the
    /// chunk; the producer is never told and never delayed beyond an
    /// O(readers) registry scan. Always returns the full input length.
    pub fn broadcast(&self, chunk: &[u8]) -> usize {
        let data = Bytes::copy_from_slice(chunk);
        {
            let registry = self.inner.lock_registry();
            for (id, queue) in &registry.readers {
                if !queue.try_push(data.clone()) {
                    tracing::trace!(reader = *id, len = data.len(), "reader backlog full, chunk missed");
                }
            }
        }
        self.inner.chunks.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        chunk.len()
    }

    /// End the stream for every registered reader
    ///
    /// Each reader reaches end-of-stream once it drains what is already in
    /// its queue. Idempotent. Readers created after this call start at
    /// end-of-stream; broadcasting again requires a fresh `Tee`.
    pub fn close(&self) {
        let mut registry = self.inner.lock_registry();
        registry.closed = true;
        if registry.readers.is_empty() {
            return;
        }
        let readers = registry.readers.len();
        for queue in registry.readers.values() {
            queue.close();
        }
        registry.readers.clear();
        drop(registry);
        tracing::debug!(readers, "tee closed");
    }

    /// Register a reader that receives every chunk broadcast from now on
    ///
    /// `highwater` bounds the reader's queue in chunks; once full, further
    /// chunks are missed until the reader catches up. `lowwater` is the
    /// number of chunks a read coalesces before returning when the queue is
    /// empty at read time (0 or 1 returns on the first chunk).
    pub fn subscribe(&self, lowwater: usize, highwater: usize) -> TeeReader {
        self.register(None, lowwater, highwater)
    }

    /// Like [`subscribe`](Tee::subscribe), with a cancellation token
    /// observed during blocking reads
    pub fn subscribe_with_token(
        &self,
        token: CancellationToken,
        lowwater: usize,
        highwater: usize,
    ) -> TeeReader {
        self.register(Some(token), lowwater, highwater)
    }

    fn register(
        &self,
        token: Option<CancellationToken>,
        lowwater: usize,
        highwater: usize,
    ) -> TeeReader {
        let queue = Arc::new(ChunkQueue::new(highwater));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut registry = self.inner.lock_registry();
            if registry.closed {
                queue.close();
                tracing::debug!(reader = id, "reader subscribed after close, starts at end of stream");
            } else {
                registry.readers.insert(id, Arc::clone(&queue));
                tracing::debug!(reader = id, lowwater, highwater, "reader subscribed");
            }
        }
        TeeReader::new(id, queue, Arc::downgrade(&self.inner), token, lowwater)
    }

    /// Number of currently registered readers
    pub fn reader_count(&self) -> usize {
        self.inner.lock_registry().readers.len()
    }

    /// Snapshot of broadcast totals
    pub fn stats(&self) -> TeeStats {
        TeeStats {
            chunks_broadcast: self.inner.chunks.load(Ordering::Relaxed),
            bytes_broadcast: self.inner.bytes.load(Ordering::Relaxed),
            readers: self.reader_count(),
        }
    }
}

impl TeeInner {
    /// Remove a reader from the registry, returning whether it was present
    pub(crate) fn deregister(&self, id: u64) -> bool {
        self.lock_registry().readers.remove(&id).is_some()
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::io::Write for Tee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(self.broadcast(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
