use crate::adapters::outbound::{WriterConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES};
use crate::domain::value_objects::{Blacklist, BlacklistError};
use crate::infrastructure::{IngressPoolConfig, TlsFiles};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid {var}: {source}")]
    Blacklist {
        var: &'static str,
        #[source]
        source: BlacklistError,
    },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub api_url: String,
    pub api_batch_size: usize,
    pub polling_interval: Duration,
    pub adapter_addrs: Vec<String>,
    pub blacklist: Blacklist,
    pub require_drain_version: bool,
    pub health_addr: String,
    pub tls: TlsFiles,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub listen_addr: String,
    pub health_addr: String,
    pub adapter_index: String,
    /// `None` means unbounded
    pub max_bindings: Option<usize>,
    pub rlp_addr: String,
    pub pool: IngressPoolConfig,
    pub rlp_dial_timeout: Duration,
    pub writer: WriterConfig,
    pub max_retries: u32,
    pub log_ingress_url: Option<String>,
    pub tls: TlsFiles,
    pub debug: bool,
}

/// Load the scheduler configuration from the process environment.
pub fn load_scheduler_config() -> Result<SchedulerConfig, ConfigError> {
    SchedulerConfig::from_vars(|key| std::env::var(key).ok())
}

/// Load the adapter configuration from the process environment.
pub fn load_adapter_config() -> Result<AdapterConfig, ConfigError> {
    AdapterConfig::from_vars(|key| std::env::var(key).ok())
}

impl SchedulerConfig {
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&var);

        let api_url = env.required("SCHEDULER_API_URL")?;
        let api_batch_size = env.parsed("SCHEDULER_API_BATCH_SIZE", DEFAULT_BATCH_SIZE);
        let polling_interval =
            Duration::from_secs(env.parsed("SCHEDULER_API_POLLING_INTERVAL_SECS", 15));

        let adapter_addrs = env.list("SCHEDULER_ADAPTER_ADDRS");
        if adapter_addrs.is_empty() {
            return Err(ConfigError::Missing("SCHEDULER_ADAPTER_ADDRS"));
        }

        let blacklist = Blacklist::parse(&env.string("SCHEDULER_BLACKLIST_RANGES", "")).map_err(
            |source| ConfigError::Blacklist {
                var: "SCHEDULER_BLACKLIST_RANGES",
                source,
            },
        )?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_batch_size,
            polling_interval,
            adapter_addrs,
            blacklist,
            require_drain_version: env.flag("SCHEDULER_REQUIRE_DRAIN_VERSION", true),
            health_addr: env.string("SCHEDULER_HEALTH_ADDR", "0.0.0.0:8080"),
            tls: env.tls("SCHEDULER"),
            debug: var("DEBUG").is_some(),
        })
    }
}

impl AdapterConfig {
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&var);
        let defaults = IngressPoolConfig::default();
        let writer_defaults = WriterConfig::default();

        let pool = IngressPoolConfig {
            conn_count: env.parsed("ADAPTER_RLP_CONN_COUNT", defaults.conn_count),
            ttl: Duration::from_secs(
                env.parsed("ADAPTER_RLP_CONN_TTL_SECS", defaults.ttl.as_secs()),
            ),
            check_interval: Duration::from_millis(env.parsed(
                "ADAPTER_RLP_CHECK_INTERVAL_MS",
                defaults.check_interval.as_millis() as u64,
            )),
            retry_wait: Duration::from_millis(env.parsed(
                "ADAPTER_RLP_RETRY_WAIT_MS",
                defaults.retry_wait.as_millis() as u64,
            )),
        };

        let writer = WriterConfig {
            dial_timeout: Duration::from_secs(env.parsed(
                "ADAPTER_SYSLOG_DIAL_TIMEOUT_SECS",
                writer_defaults.dial_timeout.as_secs(),
            )),
            io_timeout: Duration::from_secs(env.parsed(
                "ADAPTER_SYSLOG_IO_TIMEOUT_SECS",
                writer_defaults.io_timeout.as_secs(),
            )),
            skip_cert_verify: env.flag("ADAPTER_SYSLOG_SKIP_CERT_VERIFY", false),
        };

        Ok(Self {
            listen_addr: env.string("ADAPTER_LISTEN_ADDR", "0.0.0.0:4443"),
            health_addr: env.string("ADAPTER_HEALTH_ADDR", "0.0.0.0:8081"),
            adapter_index: env.string("ADAPTER_INDEX", "0"),
            max_bindings: var("ADAPTER_MAX_BINDINGS").and_then(|v| v.trim().parse().ok()),
            rlp_addr: env.required("ADAPTER_RLP_ADDR")?,
            pool,
            rlp_dial_timeout: Duration::from_secs(env.parsed("ADAPTER_RLP_DIAL_TIMEOUT_SECS", 10)),
            writer,
            max_retries: env.parsed("ADAPTER_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            log_ingress_url: var("ADAPTER_LOG_INGRESS_URL").filter(|v| !v.is_empty()),
            tls: env.tls("ADAPTER"),
            debug: var("DEBUG").is_some(),
        })
    }
}

/// Lookup helpers over a variable source.
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        (self.0)(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(key))
    }

    /// Unset or unparseable values fall back to `default`.
    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.0)(key)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(default)
    }

    fn list(&self, key: &str) -> Vec<String> {
        (self.0)(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tls(&self, prefix: &str) -> TlsFiles {
        let path = |name: &str| (self.0)(&format!("{}_{}", prefix, name)).map(PathBuf::from);
        TlsFiles {
            ca: path("CA_FILE"),
            cert: path("CERT_FILE"),
            key: path("KEY_FILE"),
        }
    }
}
