//! HTTP Binding Fetcher
//!
//! Implements BindingFetcher against the provider's internal drain API,
//! paging through `/internal/v4/syslog_drain_urls` until `next_id` runs out.

use crate::domain::entities::Binding;
use crate::domain::ports::{BindingFetcher, FetchError, FetchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Default page size.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Drains of one application.
#[derive(Debug, Deserialize)]
struct AppBindings {
    #[serde(default)]
    drains: Vec<String>,
    #[serde(default)]
    hostname: String,
}

/// One page of the provider response.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    results: BTreeMap<String, AppBindings>,
    next_id: Option<u64>,
}

/// Fetches the desired binding set from the provider over HTTP(S).
pub struct HttpBindingFetcher {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
}

impl HttpBindingFetcher {
    /// `client` carries the mTLS identity when the provider requires one.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
        }
    }

    async fn page(&self, next_id: u64) -> Result<Page, FetchError> {
        let url = format!("{}/internal/v4/syslog_drain_urls", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("batch_size", self.batch_size as u64), ("next_id", next_id)])
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BindingFetcher for HttpBindingFetcher {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let mut result = FetchResult::default();
        let mut next_id = 0;

        loop {
            let page = self.page(next_id).await?;

            for (app_id, app) in page.results {
                for drain in app.drains {
                    result.drain_count += 1;
                    result
                        .bindings
                        .push(Binding::new(app_id.clone(), app.hostname.clone(), drain));
                }
            }

            match page.next_id {
                Some(id) if id != 0 => next_id = id,
                _ => break,
            }
        }

        tracing::debug!(
            "fetched {} drains from {}",
            result.drain_count,
            self.base_url
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer, batch_size: usize) -> HttpBindingFetcher {
        HttpBindingFetcher::new(reqwest::Client::new(), server.uri(), batch_size)
    }

    #[tokio::test]
    async fn test_fetch_single_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/internal/v4/syslog_drain_urls"))
            .and(query_param("batch_size", "2"))
            .and(query_param("next_id", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "app-guid": {
                        "hostname": "org.space.app",
                        "drains": ["syslog://10.0.0.1:514", "https://drain.example.com"]
                    }
                },
                "next_id": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = fetcher(&server, 2).fetch().await.unwrap();

        assert_eq!(result.drain_count, 2);
        assert_eq!(result.invalid, 0);
        assert_eq!(
            result.bindings,
            vec![
                Binding::new("app-guid", "org.space.app", "syslog://10.0.0.1:514"),
                Binding::new("app-guid", "org.space.app", "https://drain.example.com"),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_follows_next_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/internal/v4/syslog_drain_urls"))
            .and(query_param("next_id", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "app-1": {"hostname": "h1", "drains": ["syslog://a:1"]}
                },
                "next_id": 50
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/internal/v4/syslog_drain_urls"))
            .and(query_param("next_id", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "app-2": {"hostname": "h2", "drains": ["syslog://b:2"]}
                },
                "next_id": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = fetcher(&server, 1000).fetch().await.unwrap();

        assert_eq!(result.drain_count, 2);
        assert_eq!(result.bindings[0].app_id, "app-1");
        assert_eq!(result.bindings[1].app_id, "app-2");
    }

    #[tokio::test]
    async fn test_fetch_non_200_discards_partial_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("next_id", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {"app-1": {"hostname": "h1", "drains": ["syslog://a:1"]}},
                "next_id": 7
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("next_id", "7"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(&server, 10).fetch().await.unwrap_err();
        assert_eq!(err, FetchError::Status(503));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = fetcher(&server, 10).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_empty_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": {}, "next_id": null})),
            )
            .mount(&server)
            .await;

        let result = fetcher(&server, 10).fetch().await.unwrap();
        assert_eq!(result, FetchResult::default());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let fetcher = HttpBindingFetcher::new(reqwest::Client::new(), "http://127.0.0.1:1", 10);
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let fetcher = HttpBindingFetcher::new(reqwest::Client::new(), "http://provider/", 0);
        assert_eq!(fetcher.base_url, "http://provider");
        assert_eq!(fetcher.batch_size, 1);
    }
}
