//! Binding Manager - the adapter's set of live subscriptions
//!
//! Keyed by binding value. Adds and deletes are idempotent; the
//! subscription count never exceeds `max_bindings`.

use crate::domain::entities::{Binding, Envelope, LogType};
use crate::domain::ports::{Counter, Gauge, LogClient, MetricsRegistry, SubscriptionStarter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Payload of the log sent to an app whose drain could not be scheduled.
pub const REJECTION_MESSAGE: &str = "Syslog adapter has failed to schedule your drain stream";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("max bindings exceeded")]
    MaxBindingsExceeded,
}

pub struct BindingManager {
    subscriptions: RwLock<HashMap<Binding, CancellationToken>>,
    starter: Arc<dyn SubscriptionStarter>,
    log_client: Arc<dyn LogClient>,
    max_bindings: Option<usize>,
    adapter_index: String,
    drain_bindings: Arc<dyn Gauge>,
    rejected: Arc<dyn Counter>,
}

impl BindingManager {
    /// `max_bindings` of `None` means unbounded. `adapter_index` becomes
    /// the instance id of rejection logs.
    pub fn new(
        starter: Arc<dyn SubscriptionStarter>,
        log_client: Arc<dyn LogClient>,
        max_bindings: Option<usize>,
        adapter_index: impl Into<String>,
        metrics: &dyn MetricsRegistry,
    ) -> Self {
        let drain_bindings = metrics.gauge("drain_bindings", "Bindings held by this adapter", &[]);
        drain_bindings.set(0);

        Self {
            subscriptions: RwLock::new(HashMap::new()),
            starter,
            log_client,
            max_bindings,
            adapter_index: adapter_index.into(),
            drain_bindings,
            rejected: metrics.counter(
                "rejected_bindings",
                "Bindings rejected because the adapter was full",
                &[],
            ),
        }
    }

    /// Start draining `binding`. No-op if it is already held.
    pub async fn add(&self, binding: Binding) -> Result<(), BindingError> {
        {
            let mut subs = self.subscriptions.write();
            if subs.contains_key(&binding) {
                return Ok(());
            }

            let full = self.max_bindings.map_or(false, |max| subs.len() >= max);
            if !full {
                tracing::info!("starting subscription for {}", binding);
                let cancel = self.starter.start(binding.clone());
                subs.insert(binding, cancel);
                self.drain_bindings.set(subs.len() as u64);
                return Ok(());
            }
        }

        self.reject(&binding);
        Err(BindingError::MaxBindingsExceeded)
    }

    /// Count the rejection and tell the app in the background, so the
    /// caller gets its answer without waiting on the log ingress.
    fn reject(&self, binding: &Binding) {
        self.rejected.inc(1);
        tracing::warn!(
            "max bindings ({}) reached, rejecting {}",
            self.max_bindings.unwrap_or_default(),
            binding
        );

        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let env = Envelope::log(&binding.app_id, timestamp, REJECTION_MESSAGE, LogType::Err)
            .with_tag("source_type", "LGR")
            .with_instance_id(&self.adapter_index);

        let log_client = self.log_client.clone();
        let app_id = binding.app_id.clone();
        tokio::spawn(async move {
            if let Err(e) = log_client.emit_log(env).await {
                tracing::error!("failed to notify app {} of rejection: {}", app_id, e);
            }
        });
    }

    /// Stop draining `binding`. No-op if it is not held.
    pub fn delete(&self, binding: &Binding) {
        let mut subs = self.subscriptions.write();
        if let Some(cancel) = subs.remove(binding) {
            cancel.cancel();
            self.drain_bindings.set(subs.len() as u64);
            tracing::info!("stopped subscription for {}", binding);
        }
    }

    /// Snapshot of the held bindings, sorted.
    pub fn list(&self) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self.subscriptions.read().keys().cloned().collect();
        bindings.sort();
        bindings
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Cancel every subscription. Used on shutdown.
    pub fn stop_all(&self) {
        let mut subs = self.subscriptions.write();
        for (_, cancel) in subs.drain() {
            cancel.cancel();
        }
        self.drain_bindings.set(0);
    }
}
