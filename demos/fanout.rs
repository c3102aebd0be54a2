//! Lossy fan-out demo
//!
//! Run with: cargo run --example fanout
//!
//! One producer broadcasts numbered lines at a steady rate while three
//! readers consume them differently:
//!
//! - `fast` reads continuously and sees everything
//! - `bursty` coalesces with a low-water mark, waking once per burst
//! - `slow` sleeps between reads, keeps falling behind, and repeatedly
//!   sheds its backlog to stay fresh
//!
//! Set RUST_LOG=lossytee=debug to watch subscriptions and backlog drops.

use std::time::Duration;

use lossytee::{Tee, TeeReader};

async fn drain(name: &'static str, mut reader: TeeReader, nap: Option<Duration>) {
    let mut buf = [0u8; 1024];
    let mut total = 0usize;
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                if let Some(nap) = nap {
                    tokio::time::sleep(nap).await;
                }
            }
            Err(e) => {
                eprintln!("{name}: read failed: {e}");
                break;
            }
        }
    }
    let stats = reader.stats();
    println!(
        "{name:>6}: {total} bytes, {} chunks delivered, {} dropped, {} discarded",
        stats.delivered, stats.dropped, stats.discarded
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lossytee=info".into()),
        )
        .init();

    let tee = Tee::new();

    let fast = tee.subscribe(1, 64);
    let bursty = tee.subscribe(16, 64);
    let slow = tee.subscribe(1, 4);

    let producer = {
        let tee = tee.clone();
        tokio::spawn(async move {
            for i in 0..500u32 {
                let line = format!("event {i:03}\n");
                tee.broadcast(line.as_bytes());
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            tee.close();
        })
    };

    let readers = vec![
        tokio::spawn(drain("fast", fast, None)),
        tokio::spawn(drain("bursty", bursty, None)),
        tokio::spawn(drain("slow", slow, Some(Duration::from_millis(20)))),
    ];

    producer.await.unwrap();
    for handle in readers {
        handle.await.unwrap();
    }

    let stats = tee.stats();
    println!(
        " total: {} chunks, {} bytes broadcast",
        stats.chunks_broadcast, stats.bytes_broadcast
    );
}
