//! Ingress Ports
//!
//! Defines how subscribers read envelopes from the log provider:
//! a connector produces clients, a client opens streams.

use crate::domain::entities::Envelope;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors on the ingress path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngressError {
    #[error("failed to dial log provider: {0}")]
    Dial(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("stream closed")]
    Closed,
    #[error("failed to decode envelope: {0}")]
    Decode(String),
}

/// Selector sent with a stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressRequest {
    pub shard_id: String,
    /// Only envelopes with this source id are delivered
    pub source_id: String,
}

/// An open stream of envelopes.
#[async_trait]
pub trait EnvelopeStream: Send {
    /// Next envelope. Errors are terminal for the stream.
    async fn recv(&mut self) -> Result<Envelope, IngressError>;
}

/// A connected log provider client.
#[async_trait]
pub trait IngressClient: Send + Sync {
    /// Open a stream of log envelopes for the request.
    async fn receiver(&self, req: EgressRequest) -> Result<Box<dyn EnvelopeStream>, IngressError>;

    /// Whether the client may still be handed out by the pool.
    fn valid(&self) -> bool;

    /// Mark the client unusable; the pool replaces it on its next check.
    fn invalidate(&self);

    async fn close(&self);
}

/// Dials new clients for the ingress pool.
#[async_trait]
pub trait IngressConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn IngressClient>, IngressError>;
}
