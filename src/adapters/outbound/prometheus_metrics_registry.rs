//! Prometheus Metrics Registry
//!
//! Implements MetricsRegistry with atomic counters and gauges and renders
//! them in the Prometheus text exposition format.

use crate::domain::ports::{Counter, Gauge, MetricsRegistry};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

/// All series sharing one metric name.
struct Family {
    help: String,
    kind: MetricKind,
    /// Rendered label set -> value
    series: DashMap<String, Arc<AtomicU64>>,
}

/// Counter handle backed by an atomic.
pub struct PrometheusCounter(Arc<AtomicU64>);

impl Counter for PrometheusCounter {
    fn inc(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Gauge handle backed by an atomic.
pub struct PrometheusGauge(Arc<AtomicU64>);

impl Gauge for PrometheusGauge {
    fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Process-wide metrics registry.
#[derive(Default)]
pub struct PrometheusMetricsRegistry {
    families: DashMap<String, Arc<Family>>,
}

impl PrometheusMetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn series(
        &self,
        name: &str,
        help: &str,
        kind: MetricKind,
        labels: &[(&str, &str)],
    ) -> Arc<AtomicU64> {
        let family = self
            .families
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Family {
                    help: help.to_string(),
                    kind,
                    series: DashMap::new(),
                })
            })
            .clone();

        if family.kind != kind {
            tracing::warn!(
                "metric {} registered as {} and requested as {}",
                name,
                family.kind.as_str(),
                kind.as_str()
            );
        }

        let value = family
            .series
            .entry(render_labels(labels))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        value
    }

    /// Current value of a series, if it was ever registered.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        let family = self.families.get(name)?;
        let value = family
            .series
            .get(&render_labels(labels))
            .map(|v| v.load(Ordering::Relaxed));
        value
    }

    /// Export all metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut names: Vec<String> = self.families.iter().map(|e| e.key().clone()).collect();
        names.sort();

        let mut output = String::new();
        for name in names {
            let Some(family) = self.families.get(&name).map(|f| f.clone()) else {
                continue;
            };

            output.push_str(&format!("# HELP {} {}\n", name, family.help));
            output.push_str(&format!("# TYPE {} {}\n", name, family.kind.as_str()));

            let mut series: Vec<(String, u64)> = family
                .series
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect();
            series.sort();

            for (labels, value) in series {
                if labels.is_empty() {
                    output.push_str(&format!("{} {}\n", name, value));
                } else {
                    output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
                }
            }
        }
        output
    }
}

impl MetricsRegistry for PrometheusMetricsRegistry {
    fn counter(&self, name: &str, help: &str, labels: &[(&str, &str)]) -> Arc<dyn Counter> {
        Arc::new(PrometheusCounter(self.series(
            name,
            help,
            MetricKind::Counter,
            labels,
        )))
    }

    fn gauge(&self, name: &str, help: &str, labels: &[(&str, &str)]) -> Arc<dyn Gauge> {
        Arc::new(PrometheusGauge(self.series(
            name,
            help,
            MetricKind::Gauge,
            labels,
        )))
    }
}

fn render_labels(labels: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = labels.iter().collect();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
