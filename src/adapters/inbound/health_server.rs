//! Health Server
//!
//! `GET /health` renders selected metric values as a JSON object and
//! `GET /metrics` exports the whole registry in Prometheus text format.

use crate::adapters::outbound::PrometheusMetricsRegistry;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// `(json key, metric name)` pairs exposed on `/health`.
pub type HealthFields = &'static [(&'static str, &'static str)];

pub const SCHEDULER_HEALTH: HealthFields = &[
    ("drainCount", "drain_count"),
    ("adapterCount", "adapters"),
    ("blacklistedOrInvalidUrlCount", "blacklisted_or_invalid_url_count"),
];

pub const ADAPTER_HEALTH: HealthFields = &[("drainCount", "drain_bindings")];

#[derive(Clone)]
struct HealthState {
    registry: Arc<PrometheusMetricsRegistry>,
    fields: HealthFields,
}

pub struct HealthServer {
    listen_addr: String,
    state: HealthState,
}

impl HealthServer {
    pub fn new(
        listen_addr: String,
        registry: Arc<PrometheusMetricsRegistry>,
        fields: HealthFields,
    ) -> Self {
        Self {
            listen_addr,
            state: HealthState { registry, fields },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("health endpoint listening on {}", self.listen_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok(())
    }
}

async fn health_handler(State(state): State<HealthState>) -> Json<Value> {
    let mut body = Map::new();
    for (key, metric) in state.fields {
        let value = state.registry.value(metric, &[]).unwrap_or(0);
        body.insert((*key).to_string(), Value::from(value));
    }
    Json(Value::Object(body))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.registry.export_prometheus(),
    )
}
