//! HTTP Log Client
//!
//! Implements LogClient by POSTing envelope batches to the platform's log
//! ingress, so synthetic messages land in the application's own stream.

use crate::adapters::wire::{EnvelopeBatch, EnvelopeJson};
use crate::domain::entities::Envelope;
use crate::domain::ports::{LogClient, LogClientError};
use async_trait::async_trait;

pub struct HttpLogClient {
    client: reqwest::Client,
    url: String,
}

impl HttpLogClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl LogClient for HttpLogClient {
    async fn emit_log(&self, env: Envelope) -> Result<(), LogClientError> {
        let body = EnvelopeBatch {
            batch: vec![EnvelopeJson::from(&env)],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LogClientError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LogClientError(format!(
                "log ingress returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// LogClient that only writes to the local log. Used when no log ingress
/// is configured.
#[derive(Debug, Default)]
pub struct LocalLogClient;

#[async_trait]
impl LogClient for LocalLogClient {
    async fn emit_log(&self, env: Envelope) -> Result<(), LogClientError> {
        let payload = env
            .as_log()
            .map(|log| String::from_utf8_lossy(&log.payload).into_owned())
            .unwrap_or_default();
        tracing::warn!("app {}: {}", env.source_id, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::LogType;
    use tracing_test::traced_test;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_emit_log_posts_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/logs"))
            .and(body_json(serde_json::json!({
                "batch": [{
                    "timestamp": "5",
                    "source_id": "app-guid",
                    "instance_id": "2",
                    "tags": {"source_type": "LGR"},
                    "log": {"payload": "b29wcw==", "type": "ERR"}
                }]
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLogClient::new(reqwest::Client::new(), format!("{}/v1/logs", server.uri()));
        let env = Envelope::log("app-guid", 5, "oops", LogType::Err)
            .with_instance_id("2")
            .with_tag("source_type", "LGR");

        client.emit_log(env).await.unwrap();
    }

    #[tokio::test]
    async fn test_emit_log_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpLogClient::new(reqwest::Client::new(), server.uri());
        let env = Envelope::log("app", 0, "x", LogType::Err);

        assert!(client.emit_log(env).await.is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_local_log_client_logs_payload() {
        let env = Envelope::log("app-guid", 0, "could not schedule", LogType::Err);
        LocalLogClient.emit_log(env).await.unwrap();

        assert!(logs_contain("app app-guid: could not schedule"));
    }
}
