//! Retry policy for the balance-credit path.
//!
//! Transient store failures (write contention, pool exhaustion) are retried
//! with exponential backoff; everything else fails immediately. The sleep
//! runs on the async timer, so in-flight retries never block other requests.

use std::time::Duration;

use crate::error::AppError;

/// A credit attempt that did not succeed, with the number of invocations
/// consumed. Carried into the failed-payment audit record.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: AppError,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff delay after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run a blocking store operation under this policy.
    ///
    /// `op` is invoked synchronously (SQLite calls are blocking and fast);
    /// only the backoff between attempts awaits.
    pub async fn run_blocking<T, F>(&self, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> crate::error::Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Transient store failure (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        self.max_retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(RetryFailure {
                        attempts: attempt + 1,
                        error: e,
                    })
                }
            }
        }
    }
}
