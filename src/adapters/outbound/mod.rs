mod diode_writer;
mod dns_host_resolver;
mod http_adapter_client;
mod http_binding_fetcher;
mod http_log_client;
mod https_writer;
mod prometheus_metrics_registry;
mod retry_writer;
mod rlp_ingress_client;
mod syslog_connector;
mod tcp_writer;

pub use diode_writer::DiodeWriter;
pub use dns_host_resolver::DnsHostResolver;
pub use http_adapter_client::HttpAdapterClient;
pub use http_binding_fetcher::{HttpBindingFetcher, DEFAULT_BATCH_SIZE};
pub use http_log_client::{HttpLogClient, LocalLogClient};
pub use https_writer::HttpsWriter;
pub use prometheus_metrics_registry::PrometheusMetricsRegistry;
pub use retry_writer::{DelayStrategy, RetryWriter};
pub use rlp_ingress_client::{RlpClient, RlpConnector};
pub use syslog_connector::{SyslogConnector, WriterConfig, DEFAULT_MAX_RETRIES};
pub use tcp_writer::{drain_addr, TcpWriter, DEFAULT_SYSLOG_PORT, DEFAULT_SYSLOG_TLS_PORT};
