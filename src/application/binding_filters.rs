//! Binding Filters
//!
//! Fetchers that wrap another fetcher and drop bindings the scheduler must
//! never place: legacy drains without `drain-version=2.0`, and drains whose
//! host is malformed, unresolvable or inside a blacklisted IP range.

use crate::domain::entities::Binding;
use crate::domain::ports::{BindingFetcher, FetchError, FetchResult, HostResolver};
use crate::domain::value_objects::Blacklist;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use url::{Host, Url};

/// Query parameter every accepted drain carries.
pub const DRAIN_VERSION_PARAM: &str = "drain-version";
pub const DRAIN_VERSION: &str = "2.0";

/// Drops drains that are not `drain-version=2.0`. Silent: dropped drains
/// are not counted as invalid.
pub struct VersionFilter {
    inner: Arc<dyn BindingFetcher>,
}

impl VersionFilter {
    pub fn new(inner: Arc<dyn BindingFetcher>) -> Self {
        Self { inner }
    }

    pub fn accepts(binding: &Binding) -> bool {
        Url::parse(&binding.drain)
            .map(|url| {
                url.query_pairs()
                    .any(|(k, v)| k == DRAIN_VERSION_PARAM && v == DRAIN_VERSION)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl BindingFetcher for VersionFilter {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let mut result = self.inner.fetch().await?;
        result.bindings.retain(Self::accepts);
        Ok(result)
    }
}

/// Why a binding was rejected by the blacklist filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    InvalidUrl(String),
    MissingHost,
    Unresolvable(String),
    Blacklisted(IpAddr),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InvalidUrl(e) => write!(f, "invalid url: {}", e),
            Rejection::MissingHost => write!(f, "missing host"),
            Rejection::Unresolvable(e) => write!(f, "cannot resolve host: {}", e),
            Rejection::Blacklisted(ip) => write!(f, "resolved to blacklisted address {}", ip),
        }
    }
}

/// Rejects drains whose host cannot be parsed or resolved, or resolves
/// into a blacklisted range. One address in range is enough to reject.
pub struct BlacklistFilter {
    inner: Arc<dyn BindingFetcher>,
    blacklist: Blacklist,
    resolver: Arc<dyn HostResolver>,
}

impl BlacklistFilter {
    pub fn new(
        inner: Arc<dyn BindingFetcher>,
        blacklist: Blacklist,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        Self {
            inner,
            blacklist,
            resolver,
        }
    }

    async fn addresses(&self, drain: &str) -> Result<Vec<IpAddr>, Rejection> {
        let url = Url::parse(drain).map_err(|e| Rejection::InvalidUrl(e.to_string()))?;

        // non-special schemes keep IPv4 hosts as opaque domains; the
        // resolver handles literals
        let host = match url.host() {
            Some(Host::Ipv4(ip)) => return Ok(vec![IpAddr::V4(ip)]),
            Some(Host::Ipv6(ip)) => return Ok(vec![IpAddr::V6(ip)]),
            Some(Host::Domain(host)) if !host.is_empty() => host.to_string(),
            _ => return Err(Rejection::MissingHost),
        };

        self.resolver
            .resolve(&host)
            .await
            .map_err(|e| Rejection::Unresolvable(e.to_string()))
    }

    async fn check(
        &self,
        binding: &Binding,
        cache: &mut HashMap<String, Result<Vec<IpAddr>, Rejection>>,
    ) -> Result<(), Rejection> {
        let addrs = match cache.get(&binding.drain) {
            Some(cached) => cached.clone(),
            None => {
                let resolved = self.addresses(&binding.drain).await;
                cache.insert(binding.drain.clone(), resolved.clone());
                resolved
            }
        }?;

        match addrs.into_iter().find(|ip| self.blacklist.contains(*ip)) {
            Some(ip) => Err(Rejection::Blacklisted(ip)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BindingFetcher for BlacklistFilter {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let result = self.inner.fetch().await?;

        let mut cache = HashMap::new();
        let mut accepted = Vec::with_capacity(result.bindings.len());
        let mut invalid = result.invalid;

        for binding in result.bindings {
            match self.check(&binding, &mut cache).await {
                Ok(()) => accepted.push(binding),
                Err(reason) => {
                    invalid += 1;
                    tracing::warn!(
                        "rejected drain {} for app {}: {}",
                        binding.drain,
                        binding.app_id,
                        reason
                    );
                }
            }
        }

        Ok(FetchResult {
            bindings: accepted,
            invalid,
            drain_count: result.drain_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tracing_test::traced_test;

    struct StaticFetcher(Result<FetchResult, FetchError>);

    impl StaticFetcher {
        fn drains(drains: &[&str]) -> Arc<Self> {
            let bindings: Vec<Binding> = drains
                .iter()
                .map(|d| Binding::new("app-guid", "a-hostname", *d))
                .collect();
            Arc::new(Self(Ok(FetchResult {
                drain_count: bindings.len(),
                bindings,
                invalid: 0,
            })))
        }
    }

    #[async_trait]
    impl BindingFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<FetchResult, FetchError> {
            self.0.clone()
        }
    }

    /// Resolves `*.example.com` names from a fixed table.
    struct TableResolver(HashMap<&'static str, Vec<IpAddr>>);

    impl TableResolver {
        fn new() -> Arc<Self> {
            let mut table = HashMap::new();
            table.insert("good.example.com", vec!["1.1.1.1".parse().unwrap()]);
            table.insert(
                "mixed.example.com",
                vec!["8.8.8.8".parse().unwrap(), "14.15.16.19".parse().unwrap()],
            );
            Arc::new(Self(table))
        }
    }

    #[async_trait]
    impl HostResolver for TableResolver {
        async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(vec![ip]);
            }
            self.0
                .get(host)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, host.to_string()))
        }
    }

    fn blacklist() -> Blacklist {
        Blacklist::parse("14.15.16.17-14.15.16.20").unwrap()
    }

    fn drains(result: &FetchResult) -> Vec<&str> {
        result.bindings.iter().map(|b| b.drain.as_str()).collect()
    }

    #[tokio::test]
    async fn test_version_filter_keeps_only_v2() {
        let filter = VersionFilter::new(StaticFetcher::drains(&[
            "syslog://drain:514",
            "syslog://drain:514?drain-version=2.0",
            "syslog://drain:514?drain-version=1.0",
            "https://drain/path?foo=bar&drain-version=2.0",
            "not a url?drain-version=2.0",
        ]));

        let result = filter.fetch().await.unwrap();
        assert_eq!(
            drains(&result),
            vec![
                "syslog://drain:514?drain-version=2.0",
                "https://drain/path?foo=bar&drain-version=2.0",
            ]
        );
        assert_eq!(result.invalid, 0);
        assert_eq!(result.drain_count, 5);
    }

    #[tokio::test]
    async fn test_blacklist_rejects_range() {
        let filter = BlacklistFilter::new(
            StaticFetcher::drains(&["syslog://1.1.1.1/", "syslog://14.15.16.18/"]),
            blacklist(),
            TableResolver::new(),
        );

        let result = filter.fetch().await.unwrap();
        assert_eq!(drains(&result), vec!["syslog://1.1.1.1/"]);
        assert_eq!(result.invalid, 1);
    }

    #[tokio::test]
    async fn test_blacklist_range_is_inclusive() {
        let filter = BlacklistFilter::new(
            StaticFetcher::drains(&[
                "syslog://14.15.16.16:514",
                "syslog://14.15.16.17:514",
                "syslog://14.15.16.20:514",
                "syslog://14.15.16.21:514",
            ]),
            blacklist(),
            TableResolver::new(),
        );

        let result = filter.fetch().await.unwrap();
        assert_eq!(
            drains(&result),
            vec!["syslog://14.15.16.16:514", "syslog://14.15.16.21:514"]
        );
        assert_eq!(result.invalid, 2);
    }

    #[tokio::test]
    async fn test_any_resolved_address_in_range_rejects() {
        let filter = BlacklistFilter::new(
            StaticFetcher::drains(&[
                "syslog-tls://good.example.com:6514",
                "https://mixed.example.com/logs",
            ]),
            blacklist(),
            TableResolver::new(),
        );

        let result = filter.fetch().await.unwrap();
        assert_eq!(drains(&result), vec!["syslog-tls://good.example.com:6514"]);
        assert_eq!(result.invalid, 1);
    }

    #[tokio::test]
    async fn test_unparseable_and_unresolvable_are_invalid() {
        let filter = BlacklistFilter::new(
            StaticFetcher::drains(&[
                "::garbage::",
                "syslog:///no-host",
                "syslog://unknown.example.com:514",
                "syslog://[::1]:514",
            ]),
            Blacklist::default(),
            TableResolver::new(),
        );

        let result = filter.fetch().await.unwrap();
        assert_eq!(drains(&result), vec!["syslog://[::1]:514"]);
        assert_eq!(result.invalid, 3);
    }

    #[tokio::test]
    async fn test_invalid_counts_accumulate_through_chain() {
        let inner = Arc::new(StaticFetcher(Ok(FetchResult {
            bindings: vec![Binding::new("a", "h", "syslog://14.15.16.18:514")],
            invalid: 2,
            drain_count: 3,
        })));
        let filter = BlacklistFilter::new(inner, blacklist(), TableResolver::new());

        let result = filter.fetch().await.unwrap();
        assert!(result.bindings.is_empty());
        assert_eq!(result.invalid, 3);
        assert_eq!(result.drain_count, 3);
    }

    #[tokio::test]
    async fn test_fetch_errors_pass_through() {
        let inner = Arc::new(StaticFetcher(Err(FetchError::Status(500))));
        let filter = VersionFilter::new(Arc::new(BlacklistFilter::new(
            inner,
            blacklist(),
            TableResolver::new(),
        )));

        assert_eq!(filter.fetch().await, Err(FetchError::Status(500)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_each_rejection_is_logged() {
        let filter = BlacklistFilter::new(
            StaticFetcher::drains(&["syslog://14.15.16.18/", "syslog://14.15.16.19/"]),
            blacklist(),
            TableResolver::new(),
        );

        filter.fetch().await.unwrap();
        assert!(logs_contain("rejected drain syslog://14.15.16.18/"));
        assert!(logs_contain("rejected drain syslog://14.15.16.19/"));
        assert!(logs_contain("blacklisted address 14.15.16.19"));
    }
}
