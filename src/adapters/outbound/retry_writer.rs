//! Retry Writer
//!
//! Wraps an EgressWriter and retries failed writes with a backoff
//! strategy. Cancellation cuts the backoff short but never skips the
//! first attempt, so a flushing diode still gets its backlog out.

use crate::domain::entities::Envelope;
use crate::domain::ports::{EgressError, EgressWriter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay before retrying, given the index of the attempt that failed.
pub type DelayStrategy = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

pub struct RetryWriter {
    inner: Arc<dyn EgressWriter>,
    max_retries: u32,
    delay: DelayStrategy,
    cancel: CancellationToken,
    drain: String,
}

impl RetryWriter {
    /// At most `max_retries` attempts are made per envelope (at least one).
    pub fn new(
        inner: Arc<dyn EgressWriter>,
        max_retries: u32,
        delay: DelayStrategy,
        cancel: CancellationToken,
        drain: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            max_retries: max_retries.max(1),
            delay,
            cancel,
            drain: drain.into(),
        }
    }
}

#[async_trait]
impl EgressWriter for RetryWriter {
    async fn write(&self, env: &Envelope) -> Result<(), EgressError> {
        let mut attempt = 0;
        loop {
            let err = match self.inner.write(env).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => e,
            };

            // once cancelled each envelope gets a single attempt
            if self.cancel.is_cancelled() {
                return Err(err);
            }

            if attempt + 1 >= self.max_retries {
                tracing::warn!(
                    "giving up on envelope for {} after {} attempts: {}",
                    self.drain,
                    attempt + 1,
                    err
                );
                return Err(err);
            }

            let delay = (self.delay)(attempt);
            tracing::debug!(
                "write to {} failed (attempt {}): {}; retrying in {:?}",
                self.drain,
                attempt + 1,
                err,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(EgressError::Cancelled),
            }
            attempt += 1;
        }
    }

    async fn close(&self) -> Result<(), EgressError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::LogType;
    use crate::domain::services::backoff;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Fails the first `failures` writes, then succeeds.
    struct FlakyWriter {
        failures: u32,
        calls: AtomicU32,
        closed: AtomicBool,
        error: EgressError,
    }

    impl FlakyWriter {
        fn new(failures: u32) -> Self {
            Self::with_error(failures, EgressError::Dial("refused".to_string()))
        }

        fn with_error(failures: u32, error: EgressError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                closed: AtomicBool::new(false),
                error,
            }
        }
    }

    #[async_trait]
    impl EgressWriter for FlakyWriter {
        async fn write(&self, _env: &Envelope) -> Result<(), EgressError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }

        async fn close(&self) -> Result<(), EgressError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn env() -> Envelope {
        Envelope::log("app", 0, "x", LogType::Out)
    }

    fn fast() -> DelayStrategy {
        Arc::new(backoff::constant_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let inner = Arc::new(FlakyWriter::new(3));
        let writer = RetryWriter::new(inner.clone(), 5, fast(), CancellationToken::new(), "d");

        writer.write(&env()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(FlakyWriter::new(u32::MAX));
        let writer = RetryWriter::new(inner.clone(), 3, fast(), CancellationToken::new(), "d");

        let err = writer.write(&env()).await.unwrap_err();
        assert!(matches!(err, EgressError::Dial(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let inner = Arc::new(FlakyWriter::new(u32::MAX));
        let writer = RetryWriter::new(inner.clone(), 0, fast(), CancellationToken::new(), "d");

        assert!(writer.write(&env()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let inner = Arc::new(FlakyWriter::with_error(
            u32::MAX,
            EgressError::UnsupportedScheme("ftp".to_string()),
        ));
        let writer = RetryWriter::new(inner.clone(), 10, fast(), CancellationToken::new(), "d");

        assert!(writer.write(&env()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let inner = Arc::new(FlakyWriter::new(u32::MAX));
        let cancel = CancellationToken::new();
        let slow: DelayStrategy = Arc::new(|_| Duration::from_secs(60));
        let writer = RetryWriter::new(inner.clone(), 22, slow, cancel.clone(), "d");

        let handle = tokio::spawn(async move { writer.write(&env()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancel should unblock the retry sleep")
            .unwrap();
        assert_eq!(result, Err(EgressError::Cancelled));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_writer_still_attempts_once() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ok = Arc::new(FlakyWriter::new(0));
        let writer = RetryWriter::new(ok.clone(), 5, fast(), cancel.clone(), "d");
        assert!(writer.write(&env()).await.is_ok());

        let failing = Arc::new(FlakyWriter::new(u32::MAX));
        let writer = RetryWriter::new(failing.clone(), 5, fast(), cancel, "d");
        assert!(writer.write(&env()).await.is_err());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delay_receives_attempt_index() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let strategy: DelayStrategy = Arc::new(move |attempt| {
            record.lock().push(attempt);
            Duration::from_millis(1)
        });

        let inner = Arc::new(FlakyWriter::new(3));
        let writer = RetryWriter::new(inner, 10, strategy, CancellationToken::new(), "d");
        writer.write(&env()).await.unwrap();

        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_close_delegates() {
        let inner = Arc::new(FlakyWriter::new(0));
        let writer = RetryWriter::new(inner.clone(), 1, fast(), CancellationToken::new(), "d");

        writer.close().await.unwrap();
        assert!(inner.closed.load(Ordering::SeqCst));
    }
}
