//! Syslog Adapter
//!
//! Composition root: serves the binding RPCs and streams every held
//! binding's logs from the log provider to its drain.

use std::sync::Arc;
use std::time::Duration;
use syslog_egress::adapters::inbound::{AdapterServer, HealthServer, ADAPTER_HEALTH};
use syslog_egress::adapters::outbound::{
    DnsHostResolver, HttpLogClient, LocalLogClient, PrometheusMetricsRegistry, RlpConnector,
    SyslogConnector,
};
use syslog_egress::application::{BindingManager, Subscriber};
use syslog_egress::domain::ports::LogClient;
use syslog_egress::domain::services::backoff;
use syslog_egress::infrastructure::{shutdown_signal, IngressPool, ServerTls, ShutdownController};
use syslog_egress::load_adapter_config;
use tracing_subscriber::fmt::format::FmtSpan;

/// Upper bound on waiting for diodes to flush at exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_adapter_config()?;

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
        "starting adapter index={} listen={} rlp={} max_bindings={:?}",
        cfg.adapter_index,
        cfg.listen_addr,
        cfg.rlp_addr,
        cfg.max_bindings
    );

    let metrics = Arc::new(PrometheusMetricsRegistry::new());
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // ===== COMPOSITION ROOT =====

    // 1. Ingress: pooled log provider clients
    let rlp_tls = cfg.tls.ca.is_some() || cfg.tls.has_identity();
    let connector = RlpConnector::new(
        &cfg.rlp_addr,
        rlp_tls,
        cfg.tls.clone(),
        cfg.rlp_dial_timeout,
        Arc::new(DnsHostResolver::new()),
    )?;
    let pool = Arc::new(IngressPool::new(cfg.pool.clone(), Arc::new(connector)));
    let monitor = pool.start_monitor(shutdown.child_token());

    // 2. Egress: scheme writers behind retry and diode layers
    let syslog = SyslogConnector::new(cfg.writer.clone(), metrics.clone())?
        .with_retries(cfg.max_retries, Arc::new(backoff::exponential))
        .with_shutdown(shutdown.clone());

    let log_client: Arc<dyn LogClient> = match &cfg.log_ingress_url {
        Some(url) => {
            let http = cfg
                .tls
                .configure_client(reqwest::Client::builder().timeout(LOG_CLIENT_TIMEOUT))?
                .build()?;
            Arc::new(HttpLogClient::new(http, url.clone()))
        }
        None => Arc::new(LocalLogClient),
    };

    // 3. Application services
    let subscriber = Subscriber::new(
        pool,
        Arc::new(syslog),
        shutdown.child_token(),
        metrics.as_ref(),
    );
    let manager = Arc::new(BindingManager::new(
        Arc::new(subscriber),
        log_client,
        cfg.max_bindings,
        cfg.adapter_index.clone(),
        metrics.as_ref(),
    ));

    // 4. Inbound adapters
    let server_tls = if cfg.tls.has_identity() {
        Some(ServerTls::from_files(&cfg.tls)?)
    } else {
        tracing::warn!("no TLS identity configured, adapter RPC is plaintext");
        None
    };

    let health = HealthServer::new(cfg.health_addr.clone(), metrics.clone(), ADAPTER_HEALTH);
    let health_task = tokio::spawn(health.run(shutdown.child_token()));

    let rpc = AdapterServer::new(cfg.listen_addr.clone(), manager.clone(), server_tls);
    let result = rpc.run(shutdown.child_token()).await;

    // RPC server is down; stop every subscription and let the diodes flush
    shutdown.shutdown();
    manager.stop_all();
    if shutdown.wait_for_flush(FLUSH_TIMEOUT).await {
        tracing::info!("all drains flushed");
    }

    let _ = monitor.await;
    health_task.await??;
    result?;

    tracing::info!("adapter stopped");
    Ok(())
}
