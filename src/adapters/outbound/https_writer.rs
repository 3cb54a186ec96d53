//! HTTPS Syslog Writer
//!
//! Implements EgressWriter for `https://` drains: one POST per message,
//! body is the bare RFC 5424 message.

use super::syslog_connector::WriterConfig;
use crate::domain::entities::{Binding, Envelope};
use crate::domain::ports::{Counter, EgressError, EgressWriter};
use crate::domain::services::rfc5424;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const MAX_IDLE_PER_HOST: usize = 100;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct HttpsWriter {
    binding: Binding,
    url: url::Url,
    client: reqwest::Client,
    egress: Arc<dyn Counter>,
}

impl HttpsWriter {
    pub fn new(
        binding: Binding,
        config: &WriterConfig,
        egress: Arc<dyn Counter>,
    ) -> Result<Self, EgressError> {
        let client = Self::client(config)?;
        Self::with_client(binding, client, egress)
    }

    /// Writer sharing an existing client.
    pub fn with_client(
        binding: Binding,
        client: reqwest::Client,
        egress: Arc<dyn Counter>,
    ) -> Result<Self, EgressError> {
        let url = url::Url::parse(&binding.drain)
            .map_err(|e| EgressError::InvalidUrl(format!("{}: {}", binding.drain, e)))?;
        if url.scheme() != "https" {
            return Err(EgressError::UnsupportedScheme(url.scheme().to_string()));
        }

        Ok(Self {
            binding,
            url,
            client,
            egress,
        })
    }

    /// Pooled client honouring the dial/io timeouts and verification setting.
    pub fn client(config: &WriterConfig) -> Result<reqwest::Client, EgressError> {
        reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .connect_timeout(config.dial_timeout)
            .timeout(config.io_timeout)
            .danger_accept_invalid_certs(config.skip_cert_verify)
            .build()
            .map_err(|e| EgressError::Http(e.to_string()))
    }
}

#[async_trait]
impl EgressWriter for HttpsWriter {
    async fn write(&self, env: &Envelope) -> Result<(), EgressError> {
        let Some(msg) = rfc5424::format(&self.binding, env) else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(msg)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EgressError::IoTimeout
                } else {
                    EgressError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        // read to the end so the connection goes back to the pool
        let _ = response.bytes().await;
        if !status.is_success() {
            return Err(EgressError::HttpStatus(status.as_u16()));
        }

        self.egress.inc(1);
        Ok(())
    }

    async fn close(&self) -> Result<(), EgressError> {
        Ok(())
    }
}
