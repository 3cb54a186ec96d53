//! Syslog Egress Library
//!
//! Scheduler and adapter components for streaming application logs to
//! external syslog drains. Exposed as a library for the two binaries and
//! the integration tests.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{BindingManager, Orchestrator, Subscriber};
pub use config::{load_adapter_config, load_scheduler_config, AdapterConfig, SchedulerConfig};
pub use domain::entities::{Binding, Envelope, LogType};
pub use domain::ports::{AdapterClient, BindingFetcher, EgressWriter, MetricsRegistry};
pub use domain::services::Placement;
