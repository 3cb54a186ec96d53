//! Adapter Service
//!
//! The scheduler's handle on the adapter fleet. Lists, creates and deletes
//! bindings through one RPC client per adapter, each call bounded by its
//! own deadline. Errors are logged and returned, never fatal.

use crate::domain::entities::Binding;
use crate::domain::ports::{AdapterClient, AdapterRpcError, Counter, MetricsRegistry};
use crate::domain::value_objects::State;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Deadline for `list` on one adapter.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(3);
/// Deadline for `create` / `delete` on one adapter.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AdapterService {
    clients: Arc<[Arc<dyn AdapterClient>]>,
    bad_connections: Arc<dyn Counter>,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl AdapterService {
    pub fn new(clients: Vec<Arc<dyn AdapterClient>>, metrics: &dyn MetricsRegistry) -> Self {
        Self {
            clients: clients.into(),
            bad_connections: metrics.counter(
                "bad_adapter_connections",
                "Failed connections to adapters",
                &[],
            ),
            list_timeout: LIST_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, list_timeout: Duration, call_timeout: Duration) -> Self {
        self.list_timeout = list_timeout;
        self.call_timeout = call_timeout;
        self
    }

    /// Addresses of every configured adapter.
    pub fn addrs(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.addr().to_string()).collect()
    }

    /// Bindings held by each adapter that answered.
    ///
    /// Adapters are queried concurrently. An adapter that fails or times
    /// out is absent from the returned state, which is different from an
    /// adapter reporting no bindings.
    pub async fn list(&self) -> State {
        let mut calls = JoinSet::new();
        for client in self.clients.iter().cloned() {
            let service = self.clone();
            calls.spawn(async move {
                let addr = client.addr().to_string();
                let result = service
                    .call(&addr, "list", service.list_timeout, client.list())
                    .await;
                (addr, result)
            });
        }

        let mut state = State::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((addr, Ok(bindings))) => {
                    state.insert(addr, bindings.into_iter().collect::<BTreeSet<_>>());
                }
                Ok((_, Err(_))) => {}
                Err(e) => tracing::error!("adapter list task failed: {}", e),
            }
        }
        state
    }

    /// Ask the adapter at `addr` to hold `binding`.
    pub async fn add(&self, addr: &str, binding: &Binding) -> Result<(), AdapterRpcError> {
        let client = self.client(addr)?;
        self.call(addr, "create", self.call_timeout, client.create(binding))
            .await
    }

    /// Ask the adapter at `addr` to drop `binding`.
    pub async fn remove(&self, addr: &str, binding: &Binding) -> Result<(), AdapterRpcError> {
        let client = self.client(addr)?;
        self.call(addr, "delete", self.call_timeout, client.delete(binding))
            .await
    }

    fn client(&self, addr: &str) -> Result<Arc<dyn AdapterClient>, AdapterRpcError> {
        self.clients
            .iter()
            .find(|c| c.addr() == addr)
            .cloned()
            .ok_or_else(|| AdapterRpcError::Transport(format!("unknown adapter {}", addr)))
    }

    async fn call<T>(
        &self,
        addr: &str,
        op: &str,
        deadline: Duration,
        fut: impl Future<Output = Result<T, AdapterRpcError>>,
    ) -> Result<T, AdapterRpcError> {
        let result = match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(AdapterRpcError::Timeout),
        };

        if let Err(e) = &result {
            if matches!(e, AdapterRpcError::Connect(_)) {
                self.bad_connections.inc(1);
            }
            tracing::warn!("adapter {} {} failed: {}", addr, op, e);
        }
        result
    }
}
