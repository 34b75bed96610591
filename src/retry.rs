//! Connection-level retry with linear back-off.
//!
//! Only failures that happen before the service produced a response are
//! retried here. Any HTTP response, successful or not, ends the loop; deciding
//! whether a status is worth a new attempt belongs to the task runner.

use std::time::Duration;

use log::{debug, warn};

use crate::deadline::Deadline;
use crate::error::{Error, Result};

/// Retry budget and back-off base for one kind of retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `max_retries + 1` attempts in total.
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the given failed attempt (1-indexed): `retry_interval * attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.retry_interval.saturating_mul(attempt)
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Network-layer failure before any response was read; worth retrying.
    Connection(reqwest::Error),
    /// Anything else; returned to the caller as-is.
    Fatal(Error),
}

impl From<Error> for AttemptError {
    fn from(e: Error) -> Self {
        AttemptError::Fatal(e)
    }
}

/// Runs `operation` until it succeeds, fails fatally, or exhausts the
/// connection retry budget. Back-off sleeps count against `deadline`.
pub async fn with_connection_retry<F, Fut, T>(
    policy: &RetryPolicy,
    deadline: &Deadline,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, AttemptError>>,
{
    let total = policy.total_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(AttemptError::Fatal(e)) => {
                debug!("{}: non-retryable error: {}", operation_name, e);
                return Err(e);
            }
            Err(AttemptError::Connection(e)) => {
                if attempt >= total {
                    return Err(Error::ConnectionExhausted {
                        attempts: total,
                        source: e,
                    });
                }
                let delay = policy.delay(attempt);
                warn!(
                    "{}: connection error on attempt {}/{} ({}), retrying in {:.1}s...",
                    operation_name,
                    attempt,
                    total,
                    e,
                    delay.as_secs_f64()
                );
                deadline.sleep(delay).await?;
            }
        }
    }
}
