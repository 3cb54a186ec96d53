//! Integration tests for the adapter
//!
//! Runs the full adapter stack in-process: RPC server, binding manager,
//! subscriber, ingress pool against a mock log provider, and the egress
//! writer chain against real TCP and TLS drains on ephemeral ports.

use std::sync::Arc;
use std::time::Duration;
use syslog_egress::adapters::outbound::{
    DnsHostResolver, HttpAdapterClient, HttpBindingFetcher, LocalLogClient,
    PrometheusMetricsRegistry, RlpConnector, SyslogConnector, WriterConfig,
};
use syslog_egress::adapters::inbound::AdapterServer;
use syslog_egress::adapters::wire::{EnvelopeBatch, EnvelopeJson};
use syslog_egress::application::{AdapterService, BindingManager, Orchestrator, Subscriber};
use syslog_egress::domain::ports::{AdapterClient, AdapterRpcError};
use syslog_egress::domain::services::backoff;
use syslog_egress::infrastructure::{
    IngressPool, IngressPoolConfig, ServerTls, ShutdownController, TlsFiles,
};
use syslog_egress::{Binding, Envelope, LogType};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct AdapterHarness {
    addr: String,
    client: HttpAdapterClient,
    manager: Arc<BindingManager>,
    metrics: Arc<PrometheusMetricsRegistry>,
    shutdown: ShutdownController,
}

impl AdapterHarness {
    async fn start(provider: &MockServer, max_bindings: Option<usize>) -> Self {
        let metrics = Arc::new(PrometheusMetricsRegistry::new());
        let shutdown = ShutdownController::new();

        let connector = RlpConnector::new(
            &provider.address().to_string(),
            false,
            TlsFiles::default(),
            Duration::from_secs(1),
            Arc::new(DnsHostResolver::new()),
        )
        .unwrap();
        let pool = Arc::new(IngressPool::new(
            IngressPoolConfig {
                conn_count: 1,
                ttl: Duration::from_secs(300),
                check_interval: Duration::from_millis(50),
                retry_wait: Duration::from_millis(20),
            },
            Arc::new(connector),
        ));
        pool.start_monitor(shutdown.child_token());

        let syslog = SyslogConnector::new(WriterConfig::default(), metrics.clone())
            .unwrap()
            .with_retries(2, Arc::new(backoff::constant_millis(20)))
            .with_shutdown(shutdown.clone());

        let subscriber = Subscriber::new(
            pool,
            Arc::new(syslog),
            shutdown.child_token(),
            metrics.as_ref(),
        )
        .with_reopen_wait(Duration::from_millis(20));

        let manager = Arc::new(BindingManager::new(
            Arc::new(subscriber),
            Arc::new(LocalLogClient),
            max_bindings,
            "0",
            metrics.as_ref(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = AdapterServer::new(addr.to_string(), manager.clone(), None);
        tokio::spawn(server.serve(listener, shutdown.child_token()));

        Self {
            addr: addr.to_string(),
            client: HttpAdapterClient::new(reqwest::Client::new(), addr.to_string(), false),
            manager,
            metrics,
            shutdown,
        }
    }
}

/// SSE body carrying one batch of log envelopes.
fn sse_body(envelopes: &[Envelope]) -> String {
    let batch = EnvelopeBatch {
        batch: envelopes.iter().map(EnvelopeJson::from).collect(),
    };
    format!("data: {}\n\n", serde_json::to_string(&batch).unwrap())
}

async fn mount_stream(provider: &MockServer, source_id: &str, envelopes: &[Envelope]) {
    Mock::given(method("GET"))
        .and(path("/v2/read"))
        .and(query_param("source_id", source_id))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(envelopes)),
        )
        .mount(provider)
        .await;
}

/// Plain TCP drain forwarding everything it reads, across reconnects.
async fn tcp_drain() -> (std::net::SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Collect drain output until it contains `needle`.
async fn receive_until(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, needle: &str) -> String {
    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !received.contains(needle) {
            let chunk = rx.recv().await.unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("drain did not receive the expected message");
    received
}

async fn wait_for_metric(metrics: &PrometheusMetricsRegistry, name: &str, labels: &[(&str, &str)]) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.value(name, labels).unwrap_or(0) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} was never incremented", name));
}

#[tokio::test]
async fn test_logs_flow_from_provider_to_syslog_drain() {
    let provider = MockServer::start().await;
    mount_stream(
        &provider,
        "app-guid",
        &[
            Envelope::log("app-guid", 1_000, "hello from app", LogType::Out)
                .with_tag("source_type", "APP/PROC/WEB")
                .with_tag("source_instance", "2"),
        ],
    )
    .await;
    let (drain, mut rx) = tcp_drain().await;

    let adapter = AdapterHarness::start(&provider, None).await;
    let binding = Binding::new("app-guid", "org.space.app", format!("syslog://{}", drain));
    adapter.client.create(&binding).await.unwrap();
    assert_eq!(adapter.client.list().await.unwrap(), vec![binding.clone()]);

    let received = receive_until(&mut rx, "hello from app").await;
    assert!(received.contains("org.space.app app-guid [APP/PROC/WEB/2] - - hello from app"));

    assert!(adapter.metrics.value("ingress", &[]).unwrap_or(0) >= 1);
    wait_for_metric(&adapter.metrics, "egress", &[("drain_scheme", "syslog")]).await;
    assert_eq!(adapter.metrics.value("drain_bindings", &[]), Some(1));

    adapter.client.delete(&binding).await.unwrap();
    assert!(adapter.manager.is_empty());
    adapter.shutdown.shutdown();
}

#[tokio::test]
async fn test_scheduled_binding_streams_until_deleted() {
    let provider = MockServer::start().await;
    let envelopes: Vec<Envelope> = (0..10)
        .map(|n| Envelope::log("app-guid", n, "tick", LogType::Out))
        .collect();
    mount_stream(&provider, "app-guid", &envelopes).await;
    let (drain, mut rx) = tcp_drain().await;
    let drain_url = format!("syslog://{}", drain);

    let adapter = AdapterHarness::start(&provider, None).await;
    let scheduler_metrics = PrometheusMetricsRegistry::new();
    let adapters = AdapterService::new(
        vec![Arc::new(HttpAdapterClient::new(
            reqwest::Client::new(),
            adapter.addr.clone(),
            false,
        ))],
        &scheduler_metrics,
    );
    let orchestrator = Orchestrator::new(
        Arc::new(HttpBindingFetcher::new(reqwest::Client::new(), provider.uri(), 100)),
        adapters,
        &scheduler_metrics,
    );

    let drains = Mock::given(method("GET"))
        .and(path("/internal/v4/syslog_drain_urls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": { "app-guid": { "hostname": "a-hostname", "drains": [drain_url] } },
            "next_id": null
        })))
        .mount_as_scoped(&provider)
        .await;

    orchestrator.run_term().await.unwrap();
    assert_eq!(scheduler_metrics.value("drain_count", &[]), Some(1));
    assert_eq!(scheduler_metrics.value("adapters", &[]), Some(1));
    assert_eq!(
        adapter.manager.list(),
        vec![Binding::new("app-guid", "a-hostname", drain_url.clone())]
    );

    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while received.matches(" - - tick").count() < 10 {
            let chunk = rx.recv().await.unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("drain received fewer than 10 envelopes");

    drop(drains);
    Mock::given(method("GET"))
        .and(path("/internal/v4/syslog_drain_urls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": {} })))
        .mount(&provider)
        .await;
    let report = orchestrator.run_term().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(adapter.manager.is_empty());

    // let the diode flush whatever was in flight
    tokio::time::sleep(Duration::from_millis(300)).await;
    while rx.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut late = 0;
    while let Ok(chunk) = rx.try_recv() {
        late += String::from_utf8_lossy(&chunk).matches(" - - tick").count();
    }
    assert!(late <= 2, "{} envelopes arrived after the delete settled", late);

    adapter.shutdown.shutdown();
}

#[tokio::test]
async fn test_untrusted_tls_drain_receives_nothing() {
    let provider = MockServer::start().await;
    mount_stream(
        &provider,
        "app-guid",
        &[Envelope::log("app-guid", 1_000, "secret", LogType::Out)],
    )
    .await;

    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let tls = ServerTls::from_certs_and_key(
        vec![cert.der().clone()],
        rustls::pki_types::PrivateKeyDer::Pkcs8(key_pair.serialize_der().into()),
        None,
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = tls.acceptor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(mut stream) = acceptor.accept(stream).await {
                    let mut buf = Vec::new();
                    let _ = stream.read_to_end(&mut buf).await;
                    let _ = tx.send(buf.len());
                }
            });
        }
    });

    let adapter = AdapterHarness::start(&provider, None).await;
    let binding = Binding::new("app-guid", "host", format!("syslog-tls://localhost:{}", port));
    adapter.client.create(&binding).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    adapter.shutdown.shutdown();

    let mut plaintext = 0;
    while let Ok(n) = rx.try_recv() {
        plaintext += n;
    }
    assert_eq!(plaintext, 0);
    assert_eq!(
        adapter
            .metrics
            .value("egress", &[("drain_scheme", "syslog-tls")])
            .unwrap_or(0),
        0
    );
}

#[tokio::test]
async fn test_full_adapter_rejects_new_binding() {
    let provider = MockServer::start().await;
    let adapter = AdapterHarness::start(&provider, Some(1)).await;

    let first = Binding::new("app-1", "host", "syslog://127.0.0.1:1");
    let second = Binding::new("app-2", "host", "syslog://127.0.0.1:2");

    adapter.client.create(&first).await.unwrap();
    assert_eq!(
        adapter.client.create(&second).await,
        Err(AdapterRpcError::ResourceExhausted)
    );
    assert_eq!(adapter.client.list().await.unwrap(), vec![first]);
    assert_eq!(adapter.metrics.value("rejected_bindings", &[]), Some(1));

    adapter.shutdown.shutdown();
}

#[tokio::test]
async fn test_unsupported_drain_is_counted_invalid() {
    let provider = MockServer::start().await;
    let adapter = AdapterHarness::start(&provider, None).await;

    let binding = Binding::new("app-guid", "host", "ftp://drain.example.com:21");
    adapter.client.create(&binding).await.unwrap();

    wait_for_metric(&adapter.metrics, "invalid_drains", &[]).await;

    adapter.shutdown.shutdown();
}
