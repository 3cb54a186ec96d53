//! Egress Writer Port
//!
//! Capability shared by every writer on the path to a drain: the scheme
//! writers doing network I/O and the retry and diode layers wrapping them.

use crate::domain::entities::{Binding, Envelope};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors writing to a drain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EgressError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid drain url: {0}")]
    InvalidUrl(String),
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("dial timed out")]
    DialTimeout,
    #[error("io error: {0}")]
    Io(String),
    #[error("io timed out")]
    IoTimeout,
    #[error("drain returned status {0}")]
    HttpStatus(u16),
    #[error("http error: {0}")]
    Http(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("writer cancelled")]
    Cancelled,
}

impl EgressError {
    /// Configuration errors that no amount of retrying will fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::UnsupportedScheme(_) | Self::InvalidUrl(_))
    }
}

/// A sink for envelopes bound to one drain.
#[async_trait]
pub trait EgressWriter: Send + Sync {
    async fn write(&self, env: &Envelope) -> Result<(), EgressError>;

    async fn close(&self) -> Result<(), EgressError>;
}

/// Builds the writer chain for a binding.
pub trait EgressConnector: Send + Sync {
    /// Writer for `binding`; background work stops when `cancel` fires.
    /// Errors are permanent (bad URL, unknown scheme).
    fn connect(
        &self,
        binding: &Binding,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn EgressWriter>, EgressError>;
}
