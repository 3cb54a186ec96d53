//! Infrastructure Layer
//!
//! Cross-cutting components shared by the scheduler and the adapter.

pub mod diode;
pub mod ingress_pool;
pub mod shutdown;
pub mod tls;

pub use diode::{Alerter, Diode};
pub use ingress_pool::{IngressPool, IngressPoolConfig, IngressPoolStats};
pub use shutdown::{shutdown_signal, FlushGuard, ShutdownController};
pub use tls::{drain_connector, ServerTls, TlsFiles};
