//! Bounded per-reader delivery queue
//!
//! Each reader owns one `ChunkQueue`. The producer side (`try_push`) never
//! blocks: a full queue means the chunk is missed for that reader only. The
//! consumer side (`pop`) awaits the next chunk. Closure is an explicit flag
//! distinct from emptiness, so chunks queued before close remain readable;
//! `pop` reports end-of-stream only once the queue is both closed and empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::stats::ReaderStats;

/// Bounded chunk queue with a non-blocking producer side and an awaiting
/// consumer side
pub(crate) struct ChunkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    delivered: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

struct QueueState {
    chunks: VecDeque<Bytes>,
    closed: bool,
}

impl ChunkQueue {
    /// Create a queue holding at most `capacity` chunks
    ///
    /// A capacity of zero accepts nothing; every push is a drop.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Enqueue a chunk without blocking
    ///
    /// Returns false if the chunk was not queued because the queue is full
    /// or already closed.
    pub(crate) fn try_push(&self, chunk: Bytes) -> bool {
        let mut state = self.lock();
        if state.closed || state.chunks.len() >= self.capacity {
            drop(state);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.chunks.push_back(chunk);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Dequeue the next chunk, waiting for one to arrive
    ///
    /// Returns `None` once the queue is closed and drained. Cancel-safe: a
    /// chunk is only removed when this future completes.
    pub(crate) async fn pop(&self) -> Option<Bytes> {
        loop {
            {
                let mut state = self.lock();
                if let Some(chunk) = state.chunks.pop_front() {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    return Some(chunk);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit when no waiter is registered, so a
            // push between the check above and this await is not lost.
            self.notify.notified().await;
        }
    }

    /// Mark the queue closed, waking a blocked `pop`
    ///
    /// Idempotent. Already-queued chunks stay readable.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.notify.notify_one();
    }

    /// Discard every queued chunk, returning how many were removed
    pub(crate) fn clear_backlog(&self) -> usize {
        let mut state = self.lock();
        let n = state.chunks.len();
        state.chunks.clear();
        drop(state);
        if n > 0 {
            self.discarded.fetch_add(n as u64, Ordering::Relaxed);
        }
        n
    }

    /// Current number of queued chunks
    pub(crate) fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Whether the queue currently holds no chunks
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Maximum number of queued chunks
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the delivery counters
    pub(crate) fn stats(&self) -> ReaderStats {
        ReaderStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn chunk(byte: u8) -> Bytes {
        Bytes::copy_from_slice(&[byte; 3])
    }

    #[test]
    fn test_push_until_full_then_drop() {
        let queue = ChunkQueue::new(2);

        assert!(queue.try_push(chunk(1)));
        assert!(queue.try_push(chunk(2)));
        assert!(!queue.try_push(chunk(3)));

        assert_eq!(queue.len(), 2);
        let stats = queue.stats();
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_zero_capacity_accepts_nothing() {
        let queue = ChunkQueue::new(0);

        assert!(!queue.try_push(chunk(1)));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_pop_preserves_order() {
        let queue = ChunkQueue::new(4);

        queue.try_push(chunk(1));
        queue.try_push(chunk(2));

        assert_eq!(queue.pop().await, Some(chunk(1)));
        assert_eq!(queue.pop().await, Some(chunk(2)));
        assert_eq!(queue.stats().delivered, 2);
    }

    #[test]
    fn test_pop_is_pending_until_push() {
        use tokio_test::{assert_pending, assert_ready_eq};

        let queue = ChunkQueue::new(4);
        let mut pop = tokio_test::task::spawn(queue.pop());

        assert_pending!(pop.poll());
        assert!(queue.try_push(chunk(9)));
        assert!(pop.is_woken());
        assert_ready_eq!(pop.poll(), Some(chunk(9)));
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(ChunkQueue::new(4));

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                queue.try_push(chunk(7));
            })
        };

        assert_eq!(queue.pop().await, Some(chunk(7)));
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_pop() {
        let queue = Arc::new(ChunkQueue::new(4));

        let closer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                queue.close();
            })
        };

        assert_eq!(queue.pop().await, None);
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_queued_chunks_survive_close() {
        let queue = ChunkQueue::new(4);

        queue.try_push(chunk(1));
        queue.try_push(chunk(2));
        queue.close();

        assert_eq!(queue.pop().await, Some(chunk(1)));
        assert_eq!(queue.pop().await, Some(chunk(2)));
        assert_eq!(queue.pop().await, None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = ChunkQueue::new(4);

        queue.close();
        queue.close();

        assert!(!queue.try_push(chunk(1)));
    }

    #[test]
    fn test_clear_backlog() {
        let queue = ChunkQueue::new(4);

        queue.try_push(chunk(1));
        queue.try_push(chunk(2));
        queue.try_push(chunk(3));

        assert_eq!(queue.clear_backlog(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().discarded, 3);

        assert_eq!(queue.clear_backlog(), 0);
    }
}
