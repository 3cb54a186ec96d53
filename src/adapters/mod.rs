//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP servers); outbound
//! adapters implement the domain ports against the network.

pub mod inbound;
pub mod outbound;
pub mod wire;
