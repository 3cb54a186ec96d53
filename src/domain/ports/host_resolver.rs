//! Host Resolver Port
//!
//! Resolves drain hosts to addresses for the blacklist filter.

use async_trait::async_trait;
use std::net::IpAddr;

#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Every address the host resolves to. IP literals resolve to themselves.
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}
