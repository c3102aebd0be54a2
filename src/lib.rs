//! Lossy broadcast tee for live byte streams
//!
//! One producer broadcasts discrete chunks; any number of readers, added
//! and removed at any time, each receive a copy of the stream at their own
//! pace. The producer never blocks on a slow reader: a reader that falls
//! behind misses whole chunks (and, once far enough behind, sheds its whole
//! backlog) in order to catch up. This trades completeness for freshness —
//! the right trade for live log and event fan-out.
//!
//! # Architecture
//!
//! ```text
//!                           Tee (producer side)
//!                    ┌────────────────────────────────┐
//!     broadcast() ──►│ registry of per-reader bounded │
//!     close()        │ queues, behind one lock        │
//!                    └───────────────┬────────────────┘
//!                                    │ non-blocking enqueue,
//!                                    │ drops on a full queue
//!             ┌──────────────────────┼──────────────────────┐
//!             ▼                      ▼                      ▼
//!        [TeeReader]            [TeeReader]            [TeeReader]
//!        read().await           read().await           write_to(sink)
//! ```
//!
//! # Delivery contract
//!
//! - Chunks are atomic: a reader sees each broadcast chunk in full or not
//!   at all, never a fragment.
//! - Within one reader, observed chunks preserve broadcast order; across
//!   readers there is no ordering relationship.
//! - Delivery is best-effort: no retries, no backpressure to the producer.
//!
//! # Example
//!
//! ```
//! use lossytee::Tee;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tee = Tee::new();
//! let mut reader = tee.subscribe(1, 8);
//!
//! tee.broadcast(b"live data");
//! tee.close();
//!
//! let mut buf = [0u8; 16];
//! let n = reader.read(&mut buf).await.unwrap();
//! assert_eq!(&buf[..n], b"live data");
//! assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
//! # }
//! ```

mod broadcaster;
mod error;
mod queue;
mod reader;
mod stats;

pub use broadcaster::Tee;
pub use error::{Result, TeeError};
pub use reader::TeeReader;
pub use stats::{ReaderStats, TeeStats};

// Re-exported so callers of `subscribe_with_token` don't need a direct
// tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
