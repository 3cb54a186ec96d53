//! Syslog Scheduler
//!
//! Composition root: polls the provider for drain bindings and keeps every
//! binding placed on two adapters.

use std::sync::Arc;
use std::time::Duration;
use syslog_egress::adapters::inbound::{HealthServer, SCHEDULER_HEALTH};
use syslog_egress::adapters::outbound::{
    DnsHostResolver, HttpAdapterClient, HttpBindingFetcher, PrometheusMetricsRegistry,
};
use syslog_egress::application::{AdapterService, BlacklistFilter, Orchestrator, VersionFilter};
use syslog_egress::domain::ports::{AdapterClient, BindingFetcher};
use syslog_egress::infrastructure::{shutdown_signal, ShutdownController};
use syslog_egress::load_scheduler_config;
use tracing_subscriber::fmt::format::FmtSpan;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_scheduler_config()?;

    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting scheduler api={} adapters={} blacklist_ranges={}",
        cfg.api_url,
        cfg.adapter_addrs.len(),
        cfg.blacklist.len()
    );

    let metrics = Arc::new(PrometheusMetricsRegistry::new());
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let http = cfg
        .tls
        .configure_client(reqwest::Client::builder().timeout(PROVIDER_TIMEOUT))?
        .build()?;

    let mut fetcher: Arc<dyn BindingFetcher> = Arc::new(HttpBindingFetcher::new(
        http.clone(),
        cfg.api_url.clone(),
        cfg.api_batch_size,
    ));
    if cfg.require_drain_version {
        fetcher = Arc::new(VersionFilter::new(fetcher));
    }
    let fetcher = Arc::new(BlacklistFilter::new(
        fetcher,
        cfg.blacklist.clone(),
        Arc::new(DnsHostResolver::new()),
    ));

    let tls = cfg.tls.has_identity();
    let clients: Vec<Arc<dyn AdapterClient>> = cfg
        .adapter_addrs
        .iter()
        .map(|addr| {
            Arc::new(HttpAdapterClient::new(http.clone(), addr.clone(), tls)) as Arc<dyn AdapterClient>
        })
        .collect();

    // 2. Application services
    let adapters = AdapterService::new(clients, metrics.as_ref());
    let orchestrator = Arc::new(Orchestrator::new(fetcher, adapters, metrics.as_ref()));

    // 3. Inbound adapters and the loop
    let health = HealthServer::new(cfg.health_addr.clone(), metrics.clone(), SCHEDULER_HEALTH);
    let health_task = tokio::spawn(health.run(shutdown.child_token()));

    orchestrator
        .run(cfg.polling_interval, shutdown.child_token())
        .await;

    health_task.await??;
    tracing::info!("scheduler stopped");
    Ok(())
}
