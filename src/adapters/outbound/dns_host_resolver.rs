//! DNS Host Resolver
//!
//! Implements HostResolver with the system resolver.

use crate::domain::ports::HostResolver;
use async_trait::async_trait;
use std::net::IpAddr;

/// Resolves hosts through `getaddrinfo` on the blocking pool.
#[derive(Debug, Default, Clone)]
pub struct DnsHostResolver;

impl DnsHostResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostResolver for DnsHostResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let trimmed = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        // lookup_host wants a port; it is discarded
        let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((trimmed, 0))
            .await?
            .map(|addr| addr.ip())
            .collect();
        addrs.dedup();

        if addrs.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses for {}", host),
            ));
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let resolver = DnsHostResolver::new();
        let addrs = resolver.resolve("14.15.16.18").await.unwrap();
        assert_eq!(addrs, vec!["14.15.16.18".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_bracketed_ipv6_literal() {
        let resolver = DnsHostResolver::new();
        let addrs = resolver.resolve("[::1]").await.unwrap();
        assert_eq!(addrs, vec!["::1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let resolver = DnsHostResolver::new();
        let addrs = resolver.resolve("localhost").await.unwrap();
        assert!(addrs.iter().any(|ip| ip.is_loopback()));
    }

    #[tokio::test]
    async fn test_resolve_invalid_host_fails() {
        let resolver = DnsHostResolver::new();
        assert!(resolver.resolve("invalid host name!").await.is_err());
    }
}
