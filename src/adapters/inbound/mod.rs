mod adapter_server;
mod health_server;

pub use adapter_server::{AdapterServer, HANDSHAKE_TIMEOUT};
pub use health_server::{HealthFields, HealthServer, ADAPTER_HEALTH, SCHEDULER_HEALTH};
