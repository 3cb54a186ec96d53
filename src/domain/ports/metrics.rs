//! Metrics Port
//!
//! Abstract counter and gauge sinks. Handles are created once at startup
//! and passed to the components that update them.

use std::sync::Arc;

/// Monotonic counter.
pub trait Counter: Send + Sync {
    fn inc(&self, n: u64);
}

/// Point-in-time value.
pub trait Gauge: Send + Sync {
    fn set(&self, value: u64);
}

/// Factory for named metrics.
///
/// Requesting the same name and labels twice returns handles to the
/// same underlying value.
pub trait MetricsRegistry: Send + Sync {
    fn counter(&self, name: &str, help: &str, labels: &[(&str, &str)]) -> Arc<dyn Counter>;

    fn gauge(&self, name: &str, help: &str, labels: &[(&str, &str)]) -> Arc<dyn Gauge>;
}
