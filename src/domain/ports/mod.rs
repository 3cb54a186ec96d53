mod adapter_client;
mod binding_fetcher;
mod egress_writer;
mod host_resolver;
mod ingress;
mod log_client;
mod metrics;
mod subscription;

pub use adapter_client::{AdapterClient, AdapterRpcError};
pub use binding_fetcher::{BindingFetcher, FetchError, FetchResult};
pub use egress_writer::{EgressConnector, EgressError, EgressWriter};
pub use host_resolver::HostResolver;
pub use ingress::{EgressRequest, EnvelopeStream, IngressClient, IngressConnector, IngressError};
pub use log_client::{LogClient, LogClientError};
pub use metrics::{Counter, Gauge, MetricsRegistry};
pub use subscription::SubscriptionStarter;
