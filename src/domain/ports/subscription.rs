//! Subscription Port
//!
//! Starts the per-binding pump on an adapter.

use crate::domain::entities::Binding;
use tokio_util::sync::CancellationToken;

pub trait SubscriptionStarter: Send + Sync {
    /// Start draining `binding`. Cancelling the returned token stops it.
    fn start(&self, binding: Binding) -> CancellationToken;
}
