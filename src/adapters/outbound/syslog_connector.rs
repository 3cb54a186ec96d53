//! Syslog Connector
//!
//! Picks the scheme writer for a drain and wraps it as
//! `DiodeWriter(RetryWriter(scheme writer))`.

use super::diode_writer::DiodeWriter;
use super::https_writer::HttpsWriter;
use super::retry_writer::{DelayStrategy, RetryWriter};
use super::tcp_writer::TcpWriter;
use crate::domain::entities::Binding;
use crate::domain::ports::{EgressConnector, EgressError, EgressWriter, MetricsRegistry};
use crate::domain::services::backoff;
use crate::domain::value_objects::DrainScheme;
use crate::infrastructure::diode::{self, Alerter};
use crate::infrastructure::{drain_connector, ShutdownController};
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

/// Network settings shared by the scheme writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub dial_timeout: Duration,
    pub io_timeout: Duration,
    pub skip_cert_verify: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(60),
            skip_cert_verify: false,
        }
    }
}

/// Default attempts per envelope; with exponential backoff about an hour.
pub const DEFAULT_MAX_RETRIES: u32 = backoff::MAX_EXPONENT;

pub struct SyslogConnector {
    config: WriterConfig,
    max_retries: u32,
    delay: DelayStrategy,
    tls: TlsConnector,
    https: reqwest::Client,
    metrics: Arc<dyn MetricsRegistry>,
    shutdown: Option<ShutdownController>,
    diode_size: usize,
}

impl SyslogConnector {
    pub fn new(config: WriterConfig, metrics: Arc<dyn MetricsRegistry>) -> anyhow::Result<Self> {
        let tls = drain_connector(config.skip_cert_verify, None)?;
        let https = HttpsWriter::client(&config)?;

        Ok(Self {
            config,
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Arc::new(backoff::exponential),
            tls,
            https,
            metrics,
            shutdown: None,
            diode_size: diode::DEFAULT_SIZE,
        })
    }

    pub fn with_retries(mut self, max_retries: u32, delay: DelayStrategy) -> Self {
        self.max_retries = max_retries;
        self.delay = delay;
        self
    }

    /// Register every diode consumer with `shutdown` so exit waits for flushes.
    pub fn with_shutdown(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_diode_size(mut self, size: usize) -> Self {
        self.diode_size = size;
        self
    }

    fn scheme_writer(
        &self,
        scheme: DrainScheme,
        binding: &Binding,
    ) -> Result<Arc<dyn EgressWriter>, EgressError> {
        let egress = self.metrics.counter(
            "egress",
            "Envelopes written to drains",
            &[("drain_scheme", scheme.as_str())],
        );

        let writer: Arc<dyn EgressWriter> = match scheme {
            DrainScheme::Syslog => Arc::new(TcpWriter::new(binding.clone(), &self.config, egress)?),
            DrainScheme::SyslogTls => Arc::new(TcpWriter::tls(
                binding.clone(),
                &self.config,
                self.tls.clone(),
                egress,
            )?),
            DrainScheme::Https => Arc::new(HttpsWriter::with_client(
                binding.clone(),
                self.https.clone(),
                egress,
            )?),
        };
        Ok(writer)
    }

    fn alerter(&self, drain: &str) -> Arc<dyn Alerter> {
        let dropped = self
            .metrics
            .counter("dropped", "Envelopes dropped by full diodes", &[]);
        let drain = drain.to_string();

        Arc::new(move |missed: u64| {
            dropped.inc(missed);
            tracing::warn!("dropped {} envelopes for {}", missed, drain);
        })
    }
}

impl EgressConnector for SyslogConnector {
    fn connect(
        &self,
        binding: &Binding,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn EgressWriter>, EgressError> {
        let url = url::Url::parse(&binding.drain)
            .map_err(|e| EgressError::InvalidUrl(format!("{}: {}", binding.drain, e)))?;
        let scheme = DrainScheme::from_scheme(url.scheme())
            .ok_or_else(|| EgressError::UnsupportedScheme(url.scheme().to_string()))?;

        let inner = self.scheme_writer(scheme, binding)?;

        // closing this writer must not cancel the whole subscription
        let token = cancel.child_token();
        let retry = Arc::new(RetryWriter::new(
            inner,
            self.max_retries,
            self.delay.clone(),
            token.clone(),
            binding.drain.clone(),
        ));

        Ok(Arc::new(DiodeWriter::with_capacity(
            retry,
            self.alerter(&binding.drain),
            token,
            self.shutdown.as_ref().map(|s| s.flush_guard()),
            self.diode_size,
            diode::DEFAULT_POLL_INTERVAL,
        )))
    }
}
