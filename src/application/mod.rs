//! Application Layer
//!
//! Use cases of the two processes. The scheduler runs the orchestrator
//! over a filtered fetcher and the adapter service; the adapter runs the
//! binding manager, which starts one subscriber per binding.

mod adapter_service;
mod binding_filters;
mod binding_manager;
mod orchestrator;
mod subscriber;

pub use adapter_service::{AdapterService, CALL_TIMEOUT, LIST_TIMEOUT};
pub use binding_filters::{BlacklistFilter, VersionFilter, DRAIN_VERSION, DRAIN_VERSION_PARAM};
pub use binding_manager::{BindingError, BindingManager, REJECTION_MESSAGE};
pub use orchestrator::{Orchestrator, TermReport, DEFAULT_INTERVAL};
pub use subscriber::{Subscriber, DEFAULT_REOPEN_WAIT};
