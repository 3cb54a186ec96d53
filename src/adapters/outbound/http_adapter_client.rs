//! HTTP Adapter Client
//!
//! Implements AdapterClient with JSON-over-HTTP(S) calls to an adapter's
//! RPC server.

use crate::adapters::wire::{
    CreateBindingRequest, CreateBindingResponse, DeleteBindingRequest, DeleteBindingResponse,
    ListBindingsRequest, ListBindingsResponse, RpcStatus, CREATE_BINDING_PATH,
    DELETE_BINDING_PATH, LIST_BINDINGS_PATH, RESOURCE_EXHAUSTED,
};
use crate::domain::entities::Binding;
use crate::domain::ports::{AdapterClient, AdapterRpcError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// RPC stub for one adapter.
pub struct HttpAdapterClient {
    addr: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpAdapterClient {
    /// `addr` is `host:port`. With `tls` the client speaks HTTPS and
    /// `client` is expected to carry the mTLS identity.
    pub fn new(client: reqwest::Client, addr: impl Into<String>, tls: bool) -> Self {
        let addr = addr.into();
        let scheme = if tls { "https" } else { "http" };
        Self {
            base_url: format!("{}://{}", scheme, addr),
            addr,
            client,
        }
    }

    async fn call<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, AdapterRpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| AdapterRpcError::Transport(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        if let Ok(rpc) = serde_json::from_str::<RpcStatus>(&text) {
            if rpc.code == RESOURCE_EXHAUSTED {
                return Err(AdapterRpcError::ResourceExhausted);
            }
            return Err(AdapterRpcError::Status(status.as_u16(), rpc.message));
        }
        Err(AdapterRpcError::Status(status.as_u16(), text))
    }
}

fn map_transport_error(e: reqwest::Error) -> AdapterRpcError {
    if e.is_connect() {
        AdapterRpcError::Connect(e.to_string())
    } else if e.is_timeout() {
        AdapterRpcError::Timeout
    } else {
        AdapterRpcError::Transport(e.to_string())
    }
}

#[async_trait]
impl AdapterClient for HttpAdapterClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn list(&self) -> Result<Vec<Binding>, AdapterRpcError> {
        let resp: ListBindingsResponse = self.call(LIST_BINDINGS_PATH, &ListBindingsRequest {}).await?;
        Ok(resp.bindings)
    }

    async fn create(&self, binding: &Binding) -> Result<(), AdapterRpcError> {
        let req = CreateBindingRequest {
            binding: binding.clone(),
        };
        let _: CreateBindingResponse = self.call(CREATE_BINDING_PATH, &req).await?;
        Ok(())
    }

    async fn delete(&self, binding: &Binding) -> Result<(), AdapterRpcError> {
        let req = DeleteBindingRequest {
            binding: binding.clone(),
        };
        let _: DeleteBindingResponse = self.call(DELETE_BINDING_PATH, &req).await?;
        Ok(())
    }
}
