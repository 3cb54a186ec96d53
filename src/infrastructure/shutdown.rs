//! Process Shutdown
//!
//! Owns the root cancellation token of a process. Diode consumers hold a
//! [`FlushGuard`] while they empty their buffer so exit can wait for them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Root of the cancellation tree plus the count of pending flushes.
///
/// Every subscription derives a child token from the root token, so a
/// single `shutdown()` stops every pump in the process.
#[derive(Clone, Default)]
pub struct ShutdownController {
    root: CancellationToken,
    pending: Arc<FlushCounter>,
}

#[derive(Default)]
struct FlushCounter {
    count: AtomicUsize,
    done: Notify,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token; cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancel the root token. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            tracing::info!("shutting down, cancelling all subscriptions");
            self.root.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Writers that have not finished flushing.
    pub fn flushing(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Register a writer that must flush before exit.
    pub fn flush_guard(&self) -> FlushGuard {
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        FlushGuard {
            pending: self.pending.clone(),
        }
    }

    /// Wait until every guard is dropped. Returns `false` on timeout.
    pub async fn wait_for_flush(&self, timeout: Duration) -> bool {
        let done = self.pending.done.notified();
        tokio::pin!(done);
        done.as_mut().enable();

        if self.flushing() == 0 {
            return true;
        }

        match tokio::time::timeout(timeout, done).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "gave up after {:?} with {} writers still flushing",
                    timeout,
                    self.flushing()
                );
                false
            }
        }
    }
}

/// Held by a diode consumer until its buffer is empty.
pub struct FlushGuard {
    pending: Arc<FlushCounter>,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.pending.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.pending.done.notify_waiters();
        }
    }
}

/// Complete on SIGINT or SIGTERM, then shut `controller` down.
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    tracing::info!("received {}", signal);

    controller.shutdown();
}
