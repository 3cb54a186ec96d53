//! Subscriber - the per-binding ingress to egress pump
//!
//! Each started binding gets one task that takes a client from the ingress
//! pool, opens a stream filtered to the binding's app and writes every log
//! envelope to the binding's egress writer. Stream errors rotate the
//! client and reconnect; writer construction errors end the subscription.

use crate::domain::entities::Binding;
use crate::domain::ports::{
    Counter, EgressConnector, EgressRequest, EgressWriter, IngressClient, MetricsRegistry,
    SubscriptionStarter,
};
use crate::infrastructure::IngressPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause before reopening a stream that failed to open.
pub const DEFAULT_REOPEN_WAIT: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Subscriber {
    pool: Arc<IngressPool>,
    connector: Arc<dyn EgressConnector>,
    parent: CancellationToken,
    ingress: Arc<dyn Counter>,
    invalid_drains: Arc<dyn Counter>,
    reopen_wait: Duration,
}

impl Subscriber {
    /// Subscriptions are children of `parent`; cancelling it stops them all.
    pub fn new(
        pool: Arc<IngressPool>,
        connector: Arc<dyn EgressConnector>,
        parent: CancellationToken,
        metrics: &dyn MetricsRegistry,
    ) -> Self {
        Self {
            pool,
            connector,
            parent,
            ingress: metrics.counter("ingress", "Log envelopes received from the provider", &[]),
            invalid_drains: metrics.counter(
                "invalid_drains",
                "Subscriptions aborted because the drain could not be used",
                &[],
            ),
            reopen_wait: DEFAULT_REOPEN_WAIT,
        }
    }

    pub fn with_reopen_wait(mut self, wait: Duration) -> Self {
        self.reopen_wait = wait;
        self
    }

    /// Pump until `cancel` fires or the drain turns out to be unusable.
    pub async fn run(self, binding: Binding, cancel: CancellationToken) {
        tracing::debug!("subscriber started for {}", binding);

        while !cancel.is_cancelled() {
            let writer = match self.connector.connect(&binding, &cancel) {
                Ok(writer) => writer,
                Err(e) => {
                    self.invalid_drains.inc(1);
                    tracing::error!("aborting subscription for {}: {}", binding, e);
                    return;
                }
            };

            self.pump(&binding, writer.as_ref(), &cancel).await;
            if let Err(e) = writer.close().await {
                tracing::debug!("error closing writer for {}: {}", binding.drain, e);
            }
        }

        tracing::debug!("subscriber stopped for {}", binding);
    }

    /// One stream's worth of envelopes. Returns when the stream fails or
    /// the subscription is cancelled.
    async fn pump(&self, binding: &Binding, writer: &dyn EgressWriter, cancel: &CancellationToken) {
        let client: Arc<dyn IngressClient> = tokio::select! {
            _ = cancel.cancelled() => return,
            client = self.pool.next() => client,
        };

        let req = EgressRequest {
            shard_id: binding.shard_id(),
            source_id: binding.app_id.clone(),
        };

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = client.receiver(req) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("failed to open stream for {}: {}", binding, e);
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.reopen_wait) => {}
                }
                return;
            }
        };

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return,
                received = stream.recv() => received,
            };

            match received {
                Ok(env) => {
                    if !env.is_log() {
                        continue;
                    }
                    self.ingress.inc(1);
                    // the diode front never fails a write
                    let _ = writer.write(&env).await;
                }
                Err(e) => {
                    tracing::debug!("stream for {} failed, reconnecting: {}", binding, e);
                    client.invalidate();
                    return;
                }
            }
        }
    }
}

impl SubscriptionStarter for Subscriber {
    fn start(&self, binding: Binding) -> CancellationToken {
        let cancel = self.parent.child_token();
        tokio::spawn(self.clone().run(binding, cancel.clone()));
        cancel
    }
}
