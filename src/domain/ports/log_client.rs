//! Log Client Port
//!
//! Emits envelopes into an application's own log stream.

use crate::domain::entities::Envelope;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to emit log: {0}")]
pub struct LogClientError(pub String);

/// Writes user-visible logs back to the platform.
#[async_trait]
pub trait LogClient: Send + Sync {
    async fn emit_log(&self, env: Envelope) -> Result<(), LogClientError>;
}
