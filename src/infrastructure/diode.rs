//! Lossy Ring Buffer
//!
//! A single-producer/single-consumer ring that never blocks the producer.
//! When the producer laps the consumer, the oldest unread entries are
//! overwritten and the consumer reports how many it missed.
//!
//! ```text
//!   set() ──► [ seq 8 | seq 9 | seq 6 | seq 7 ] ──► try_next()
//!                w=10                 r=6
//! ```
//!
//! Each slot is an `ArcSwapOption`, so both sides only ever swap whole
//! buckets: the producer publishes, the consumer takes. Neither side locks.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default ring capacity.
pub const DEFAULT_SIZE: usize = 10_000;

/// Default consumer poll interval when the ring is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Receives the number of entries lost each time the consumer is lapped.
pub trait Alerter: Send + Sync {
    fn alert(&self, missed: u64);
}

impl<F> Alerter for F
where
    F: Fn(u64) + Send + Sync,
{
    fn alert(&self, missed: u64) {
        self(missed)
    }
}

struct Bucket<T> {
    data: T,
    seq: u64,
}

/// Lossy SPSC ring buffer.
pub struct Diode<T> {
    buffer: Box<[ArcSwapOption<Bucket<T>>]>,
    write_index: AtomicU64,
    read_index: AtomicU64,
    alerter: Arc<dyn Alerter>,
}

impl<T: Send + Sync> Diode<T> {
    /// Create a ring with `size` slots (at least one).
    pub fn new(size: usize, alerter: Arc<dyn Alerter>) -> Self {
        let buffer = (0..size.max(1))
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            alerter,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Publish an entry. Wait-free; overwrites the oldest slot when full.
    pub fn set(&self, data: T) {
        let seq = self.write_index.fetch_add(1, Ordering::AcqRel);
        let idx = (seq % self.buffer.len() as u64) as usize;
        self.buffer[idx].store(Some(Arc::new(Bucket { data, seq })));
    }

    /// Take the next entry, if one is ready.
    ///
    /// Must only be called from the single consumer.
    pub fn try_next(&self) -> Option<T> {
        let read = self.read_index.load(Ordering::Acquire);
        let idx = (read % self.buffer.len() as u64) as usize;

        let bucket = self.buffer[idx].swap(None)?;
        let seq = bucket.seq;

        // Left over from a lap the consumer already skipped; it was counted
        // as missed when the read head jumped past it.
        if seq < read {
            return None;
        }

        if seq > read {
            self.alerter.alert(seq - read);
        }
        self.read_index.store(seq + 1, Ordering::Release);

        // Buckets are only ever reached through swap(), so this is the sole owner.
        Arc::into_inner(bucket).map(|b| b.data)
    }

    /// Wait for the next entry, polling every `interval`.
    ///
    /// Returns `None` once `cancel` fires and the ring is empty.
    pub async fn next(&self, interval: Duration, cancel: &CancellationToken) -> Option<T> {
        loop {
            if let Some(data) = self.try_next() {
                return Some(data);
            }
            if cancel.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}
