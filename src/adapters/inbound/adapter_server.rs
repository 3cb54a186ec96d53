//! Adapter RPC Server
//!
//! JSON-over-HTTP(S) surface the scheduler drives: list, create and delete
//! bindings on this adapter's binding manager. Create and delete are
//! idempotent; a full adapter answers create with 429 RESOURCE_EXHAUSTED.

use crate::adapters::wire::{
    CreateBindingRequest, CreateBindingResponse, DeleteBindingRequest, DeleteBindingResponse,
    ListBindingsRequest, ListBindingsResponse, RpcStatus, CREATE_BINDING_PATH,
    DELETE_BINDING_PATH, LIST_BINDINGS_PATH, RESOURCE_EXHAUSTED,
};
use crate::application::{BindingError, BindingManager};
use crate::infrastructure::ServerTls;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Time allowed for a client to finish the TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AdapterServer {
    listen_addr: String,
    manager: Arc<BindingManager>,
    tls: Option<ServerTls>,
}

impl AdapterServer {
    /// Without `tls` the server speaks plain HTTP.
    pub fn new(listen_addr: String, manager: Arc<BindingManager>, tls: Option<ServerTls>) -> Self {
        Self {
            listen_addr,
            manager,
            tls,
        }
    }

    pub fn router(manager: Arc<BindingManager>) -> Router {
        Router::new()
            .route(LIST_BINDINGS_PATH, post(list_handler))
            .route(CREATE_BINDING_PATH, post(create_handler))
            .route(DELETE_BINDING_PATH, post(delete_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(manager)
    }

    /// Bind the configured address and serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        self.serve(listener, cancel).await
    }

    /// Serve on an already bound listener until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        let app = Self::router(self.manager.clone());
        let addr = listener.local_addr()?;

        match self.tls {
            None => {
                tracing::info!("adapter RPC listening on {} (plaintext)", addr);
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { cancel.cancelled().await })
                    .await?;
            }
            Some(tls) => {
                tracing::info!("adapter RPC listening on {} (TLS)", addr);
                serve_tls(listener, app, tls, cancel).await;
            }
        }

        tracing::info!("adapter RPC server on {} stopped", addr);
        Ok(())
    }
}

/// Accept loop for TLS connections. In-flight connections are dropped on
/// cancellation.
async fn serve_tls(listener: TcpListener, app: Router, tls: ServerTls, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            },
        };

        let acceptor = tls.acceptor.clone();
        let service = TowerToHyperService::new(app.clone());
        connections.spawn(async move {
            let stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
                Err(_) => {
                    tracing::debug!("TLS handshake with {} timed out", peer);
                    return;
                }
            };

            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!("connection from {} ended: {}", peer, e);
            }
        });
    }

    connections.shutdown().await;
}

// Handler functions

async fn list_handler(
    State(manager): State<Arc<BindingManager>>,
    Json(_): Json<ListBindingsRequest>,
) -> Json<ListBindingsResponse> {
    Json(ListBindingsResponse {
        bindings: manager.list(),
    })
}

async fn create_handler(
    State(manager): State<Arc<BindingManager>>,
    Json(req): Json<CreateBindingRequest>,
) -> Response {
    match manager.add(req.binding).await {
        Ok(()) => Json(CreateBindingResponse {}).into_response(),
        Err(e @ BindingError::MaxBindingsExceeded) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RpcStatus {
                code: RESOURCE_EXHAUSTED.to_string(),
                message: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn delete_handler(
    State(manager): State<Arc<BindingManager>>,
    Json(req): Json<DeleteBindingRequest>,
) -> Json<DeleteBindingResponse> {
    manager.delete(&req.binding);
    Json(DeleteBindingResponse {})
}
