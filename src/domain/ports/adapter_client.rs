//! Adapter Client Port
//!
//! Defines the scheduler's view of one adapter's RPC surface.

use crate::domain::entities::Binding;
use async_trait::async_trait;
use thiserror::Error;

/// Errors calling an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterRpcError {
    #[error("failed to connect to adapter: {0}")]
    Connect(String),
    #[error("adapter call timed out")]
    Timeout,
    #[error("adapter has reached its binding limit")]
    ResourceExhausted,
    #[error("adapter returned status {0}: {1}")]
    Status(u16, String),
    #[error("adapter transport error: {0}")]
    Transport(String),
}

/// RPC stub for a single adapter.
///
/// Create and delete are idempotent on the adapter side.
#[async_trait]
pub trait AdapterClient: Send + Sync {
    /// Address this client talks to (`host:port`).
    fn addr(&self) -> &str;

    /// Bindings currently held by the adapter.
    async fn list(&self) -> Result<Vec<Binding>, AdapterRpcError>;

    /// Ask the adapter to start draining a binding.
    async fn create(&self, binding: &Binding) -> Result<(), AdapterRpcError>;

    /// Ask the adapter to stop draining a binding.
    async fn delete(&self, binding: &Binding) -> Result<(), AdapterRpcError>;
}
