//! Lock-contention retries for SQLite writes
//!
//! Harness write-back and ledger capture can race other writers on the
//! shared database file. Those writes go through [`retry_on_lock`], which
//! retries only `SQLITE_BUSY`/`SQLITE_LOCKED` failures within the
//! `db_max_lock_wait_ms` budget.

use algolab_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Backoff schedule for lock retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    /// Total time budget across every attempt
    pub budget: Duration,
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl LockRetry {
    pub fn within(max_wait_ms: u64) -> Self {
        Self {
            budget: Duration::from_millis(max_wait_ms),
            first_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }

    /// Delay before retry number `retry` (1-based), doubling and capped
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.first_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `operation` until it succeeds, fails with a non-lock error, or
    /// the budget is spent
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut retries = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(
                            operation = label,
                            retries,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Write went through after lock retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_lock_contention() => e,
                Err(e) => return Err(e),
            };

            let waited = started.elapsed();
            if waited >= self.budget {
                error!(
                    operation = label,
                    retries,
                    waited_ms = waited.as_millis() as u64,
                    budget_ms = self.budget.as_millis() as u64,
                    error = %err,
                    "Giving up on locked database"
                );
                return Err(Error::Internal(format!(
                    "{}: database still locked after {} ms ({} retries)",
                    label,
                    waited.as_millis(),
                    retries
                )));
            }

            retries += 1;
            let delay = self.delay(retries);
            warn!(
                operation = label,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                "Database locked, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// [`LockRetry::run`] with the default schedule and a `max_wait_ms` budget
pub async fn retry_on_lock<F, Fut, T>(label: &str, max_wait_ms: u64, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    LockRetry::within(max_wait_ms).run(label, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = LockRetry::within(5000);
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
        assert_eq!(policy.delay(4), Duration::from_millis(80));
        assert_eq!(policy.delay(8), Duration::from_secs(1));
        assert_eq!(policy.delay(40), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let value = retry_on_lock("noop", 5000, || async { Ok::<_, Error>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let result = retry_on_lock("bad row", 5000, || {
            calls += 1;
            async { Err::<(), _>(Error::InvalidInput("bad transition".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_lock_text_outside_sqlx_is_not_contention() {
        let mut calls = 0;
        let result = retry_on_lock("message only", 50, || {
            calls += 1;
            async { Err::<(), _>(Error::Internal("database is locked".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
