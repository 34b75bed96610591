//! Call-wide time budget shared by every step of one operation.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Deadline fixed at call entry, plus the token that lets a caller abort early.
///
/// Every sleep and every exchange of one call is measured against the same
/// deadline; it is never reset by a sub-step.
#[derive(Debug, Clone)]
pub struct Deadline {
    started_at: Instant,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Deadline {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            started_at: Instant::now(),
            timeout,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Fails with `Cancelled` or `DeadlineExceeded` if the call must stop now.
    pub fn check(&self, task_id: Option<&str>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(self.exceeded(task_id));
        }
        Ok(())
    }

    pub fn exceeded(&self, task_id: Option<&str>) -> Error {
        Error::DeadlineExceeded {
            task_id: task_id.map(str::to_string),
            timeout: self.timeout,
        }
    }

    /// Shortens `wait` so it never runs past the deadline.
    pub fn cap(&self, wait: Duration) -> Duration {
        wait.min(self.remaining())
    }

    /// Sleeps for `wait`, capped at the remaining budget. Cancellation wakes
    /// the sleep immediately.
    pub async fn sleep(&self, wait: Duration) -> Result<()> {
        let wait = self.cap(wait);
        if wait.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
