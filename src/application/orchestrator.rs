//! Orchestrator - the scheduler's reconciliation loop
//!
//! Every term: fetch the desired bindings, list what the adapters hold,
//! plan with the placement service and issue the RPCs. Terms run
//! serially; a failed fetch skips the term.

use super::adapter_service::AdapterService;
use crate::domain::entities::Binding;
use crate::domain::ports::{BindingFetcher, Gauge, MetricsRegistry};
use crate::domain::services::Placement;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default time between terms.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Outcome of one term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermReport {
    pub desired: usize,
    pub adapters: usize,
    pub created: usize,
    pub deleted: usize,
}

pub struct Orchestrator {
    fetcher: Arc<dyn BindingFetcher>,
    adapters: AdapterService,
    drain_count: Arc<dyn Gauge>,
    invalid_count: Arc<dyn Gauge>,
    adapter_count: Arc<dyn Gauge>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn BindingFetcher>,
        adapters: AdapterService,
        metrics: &dyn MetricsRegistry,
    ) -> Self {
        Self {
            fetcher,
            adapters,
            drain_count: metrics.gauge(
                "drain_count",
                "Drains reported by the provider in the last fetch",
                &[],
            ),
            invalid_count: metrics.gauge(
                "blacklisted_or_invalid_url_count",
                "Drains rejected as blacklisted or invalid in the last fetch",
                &[],
            ),
            adapter_count: metrics.gauge(
                "adapters",
                "Adapters that answered the last list",
                &[],
            ),
        }
    }

    /// Run one term. Returns `None` when the fetch failed and the term was
    /// skipped.
    pub async fn run_term(&self) -> Option<TermReport> {
        let fetched = match self.fetcher.fetch().await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("skipping term, failed to fetch bindings: {}", e);
                return None;
            }
        };
        self.drain_count.set(fetched.drain_count as u64);
        self.invalid_count.set(fetched.invalid as u64);

        let actual = self.adapters.list().await;
        let plan = Placement::plan(&fetched.bindings, &actual, &self.adapters.addrs());

        // removals first so full adapters have room for this term's creates
        let deleted = self.fan_out(plan.deletes, false).await;
        let created = self.fan_out(plan.creates, true).await;

        self.adapter_count.set(actual.len() as u64);

        let report = TermReport {
            desired: fetched.bindings.len(),
            adapters: actual.len(),
            created,
            deleted,
        };
        tracing::debug!(
            "term complete: desired={} adapters={} created={} deleted={}",
            report.desired,
            report.adapters,
            report.created,
            report.deleted
        );
        Some(report)
    }

    /// Issue the operations; returns how many succeeded.
    ///
    /// Adapters are worked on concurrently, but each adapter sees its own
    /// operations one at a time, in plan order.
    async fn fan_out(&self, ops: Vec<(String, Binding)>, create: bool) -> usize {
        let mut per_adapter: BTreeMap<String, Vec<Binding>> = BTreeMap::new();
        for (addr, binding) in ops {
            per_adapter.entry(addr).or_default().push(binding);
        }

        let mut calls = JoinSet::new();
        for (addr, bindings) in per_adapter {
            let adapters = self.adapters.clone();
            calls.spawn(async move {
                let mut succeeded = 0;
                for binding in &bindings {
                    let result = if create {
                        adapters.add(&addr, binding).await
                    } else {
                        adapters.remove(&addr, binding).await
                    };
                    if result.is_ok() {
                        succeeded += 1;
                    }
                }
                succeeded
            });
        }

        let mut succeeded = 0;
        while let Some(joined) = calls.join_next().await {
            if let Ok(count) = joined {
                succeeded += count;
            }
        }
        succeeded
    }

    /// Run a term every `interval` until cancelled. The first term starts
    /// immediately.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            "orchestrator started: {} adapters, interval {:?}",
            self.adapters.addrs().len(),
            interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_term().await;
                }
            }
        }

        tracing::info!("orchestrator stopped");
    }
}
