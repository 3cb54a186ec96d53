//! Binding Fetcher Port
//!
//! Defines the interface for reading the desired set of drain bindings.
//! Filters wrap a fetcher and are fetchers themselves.

use crate::domain::entities::Binding;
use async_trait::async_trait;
use thiserror::Error;

/// Result of one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// Bindings that survived every filter
    pub bindings: Vec<Binding>,
    /// Bindings rejected as blacklisted or unparseable
    pub invalid: usize,
    /// Drains reported by the provider before filtering
    pub drain_count: usize,
}

/// Errors reading bindings from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("unexpected status code from provider: {0}")]
    Status(u16),
    #[error("request to provider failed: {0}")]
    Http(String),
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

/// Source of the desired binding set.
#[async_trait]
pub trait BindingFetcher: Send + Sync {
    /// Fetch the current bindings. Partial results are never returned.
    async fn fetch(&self) -> Result<FetchResult, FetchError>;
}
