//! Diode Writer
//!
//! Front of every egress chain. `write()` drops the envelope into a lossy
//! ring and returns immediately; a consumer task forwards entries to the
//! inner writer. On cancellation the consumer flushes what is left, closes
//! the inner writer and exits.

use crate::domain::entities::Envelope;
use crate::domain::ports::{EgressError, EgressWriter};
use crate::infrastructure::diode::{self, Alerter, Diode};
use crate::infrastructure::FlushGuard;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct DiodeWriter {
    diode: Arc<Diode<Envelope>>,
    cancel: CancellationToken,
    consumer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DiodeWriter {
    /// Ring of the default size, polled every 10ms.
    pub fn new(
        inner: Arc<dyn EgressWriter>,
        alerter: Arc<dyn Alerter>,
        cancel: CancellationToken,
        guard: Option<FlushGuard>,
    ) -> Self {
        Self::with_capacity(
            inner,
            alerter,
            cancel,
            guard,
            diode::DEFAULT_SIZE,
            diode::DEFAULT_POLL_INTERVAL,
        )
    }

    /// `guard` is held by the consumer until it has flushed, so shutdown
    /// can wait for it.
    pub fn with_capacity(
        inner: Arc<dyn EgressWriter>,
        alerter: Arc<dyn Alerter>,
        cancel: CancellationToken,
        guard: Option<FlushGuard>,
        size: usize,
        poll_interval: Duration,
    ) -> Self {
        let diode = Arc::new(Diode::new(size, alerter));

        let consumer = {
            let diode = diode.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _guard = guard;
                while let Some(env) = diode.next(poll_interval, &cancel).await {
                    // the retry layer already logged the failure
                    let _ = inner.write(&env).await;
                }
                if let Err(e) = inner.close().await {
                    tracing::debug!("error closing egress writer: {}", e);
                }
            })
        };

        Self {
            diode,
            cancel,
            consumer: parking_lot::Mutex::new(Some(consumer)),
        }
    }

    /// Wait for the consumer to finish flushing. Only meaningful after
    /// `close()` or cancellation.
    pub async fn closed(&self) {
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl EgressWriter for DiodeWriter {
    async fn write(&self, env: &Envelope) -> Result<(), EgressError> {
        self.diode.set(env.clone());
        Ok(())
    }

    /// Signals the consumer to flush and close; does not wait for it.
    async fn close(&self) -> Result<(), EgressError> {
        self.cancel.cancel();
        Ok(())
    }
}

impl Drop for DiodeWriter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
