pub mod backoff;
pub mod placement;
pub mod rfc5424;

pub use placement::{Placement, Plan, REPLICATION_FACTOR};
