//! # Fixed Backoff
//!
//! Retry policy shared by the connector and the reconciler: a fixed delay
//! between attempts, an optional cap on the number of attempts, and waits
//! that end early when the invocation is cancelled.
//!
//! ## Usage
//!
//! ```rust
//! use vault_initializer::controller::backoff::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::fixed(Duration::from_secs(5)).with_max_attempts(Some(3));
//! let mut backoff = policy.backoff();
//! backoff.record_attempt();
//! assert_eq!(backoff.attempts(), 1);
//! assert!(!backoff.is_exhausted());
//! ```

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a retry loop stopped without succeeding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetryStop {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("gave up after {attempts} attempt(s)")]
    Exhausted { attempts: u32 },
}

/// Fixed-interval retry policy
///
/// `max_attempts = None` retries forever; the only ceiling is then the
/// cancellation token handed to [`FixedBackoff::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(
            crate::constants::DEFAULT_RETRY_INTERVAL_SECS,
        ))
    }
}

impl RetryPolicy {
    /// Unbounded retries with a fixed delay
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Cap the number of attempts. `None` and `Some(0)` both mean unbounded.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts.filter(|n| *n > 0);
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Fresh attempt tracker for one retry loop
    #[must_use]
    pub fn backoff(&self) -> FixedBackoff {
        FixedBackoff {
            policy: *self,
            attempts: 0,
        }
    }
}

/// Per-loop attempt tracker
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl FixedBackoff {
    /// Count an attempt that is about to be made
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn next_backoff(&self) -> Duration {
        self.policy.interval
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
    }

    /// Sleep before the next attempt
    ///
    /// # Errors
    /// [`RetryStop::Exhausted`] without sleeping when the attempt cap is
    /// reached, [`RetryStop::Cancelled`] as soon as `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), RetryStop> {
        if self.is_exhausted() {
            return Err(RetryStop::Exhausted {
                attempts: self.attempts,
            });
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RetryStop::Cancelled { attempts: self.attempts }),
            () = tokio::time::sleep(self.policy.interval) => Ok(()),
        }
    }

    /// Reset the attempt count
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Run `fut` unless `cancel` fires first. Returns `None` when cancelled.
pub async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}
