//! Ingress Client Pool
//!
//! Maintains a fixed number of pre-dialed log provider clients and rolls
//! them over on a TTL so long-lived streams do not pile up on a single
//! provider instance.

use crate::domain::ports::{IngressClient, IngressConnector};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ingress pool configuration.
#[derive(Debug, Clone)]
pub struct IngressPoolConfig {
    /// Number of client slots
    pub conn_count: usize,
    /// Maximum client lifetime before it is replaced
    pub ttl: Duration,
    /// How often the monitor inspects the slots
    pub check_interval: Duration,
    /// Sleep in `next()` when the selected slot is empty
    pub retry_wait: Duration,
}

impl Default for IngressPoolConfig {
    fn default() -> Self {
        Self {
            conn_count: 5,
            ttl: Duration::from_secs(300),
            check_interval: Duration::from_secs(1),
            retry_wait: Duration::from_millis(100),
        }
    }
}

/// A connected client and when it was dialed.
struct Slot {
    client: Arc<dyn IngressClient>,
    created_at: Instant,
}

impl Slot {
    fn new(client: Arc<dyn IngressClient>) -> Self {
        Self {
            client,
            created_at: Instant::now(),
        }
    }

    /// Check if this client must be rotated out.
    fn needs_replacement(&self, ttl: Duration) -> bool {
        !self.client.valid() || self.created_at.elapsed() >= ttl
    }
}

/// Pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressPoolStats {
    /// Slots holding a client
    pub connected: usize,
    /// Total slots
    pub size: usize,
}

/// Round-robin pool of log provider clients.
pub struct IngressPool {
    config: IngressPoolConfig,
    connector: Arc<dyn IngressConnector>,
    slots: Mutex<Vec<Option<Slot>>>,
    cursor: AtomicUsize,
}

impl IngressPool {
    /// Create an empty pool. Call [`IngressPool::check`] or start the
    /// monitor to dial the slots.
    pub fn new(config: IngressPoolConfig, connector: Arc<dyn IngressConnector>) -> Self {
        let size = config.conn_count.max(1);
        Self {
            config,
            connector,
            slots: Mutex::new((0..size).map(|_| None).collect()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next usable client, round-robin.
    ///
    /// Sleeps `retry_wait` and moves on whenever the selected slot is empty
    /// or invalid; never returns without a client.
    pub async fn next(&self) -> Arc<dyn IngressClient> {
        loop {
            let client = {
                let slots = self.slots.lock();
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % slots.len();
                slots[idx]
                    .as_ref()
                    .filter(|s| s.client.valid())
                    .map(|s| s.client.clone())
            };

            if let Some(client) = client {
                return client;
            }
            tokio::time::sleep(self.config.retry_wait).await;
        }
    }

    /// One monitor pass: dial empty slots and replace invalid or expired ones.
    pub async fn check(&self) {
        let due: Vec<usize> = {
            let slots = self.slots.lock();
            slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| match slot {
                    None => true,
                    Some(s) => s.needs_replacement(self.config.ttl),
                })
                .map(|(i, _)| i)
                .collect()
        };

        for idx in due {
            // dial outside the lock; next() keeps serving the other slots
            let replacement = match self.connector.connect().await {
                Ok(client) => Some(Slot::new(client)),
                Err(e) => {
                    tracing::warn!("ingress pool: failed to dial slot {}: {}", idx, e);
                    None
                }
            };

            let old = std::mem::replace(&mut self.slots.lock()[idx], replacement);
            if let Some(old) = old {
                tracing::debug!(
                    "ingress pool: rotated slot {} after {:?}",
                    idx,
                    old.created_at.elapsed()
                );
                old.client.close().await;
            }
        }
    }

    /// Start the background monitor task.
    pub fn start_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.check_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => pool.check().await,
                    _ = cancel.cancelled() => break,
                }
            }

            pool.close_all().await;
        })
    }

    /// Close every client and empty the slots.
    pub async fn close_all(&self) {
        let clients: Vec<Arc<dyn IngressClient>> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter_map(|s| s.take().map(|s| s.client))
                .collect()
        };
        for client in clients {
            client.close().await;
        }
    }

    pub fn stats(&self) -> IngressPoolStats {
        let slots = self.slots.lock();
        IngressPoolStats {
            connected: slots.iter().filter(|s| s.is_some()).count(),
            size: slots.len(),
        }
    }
}
