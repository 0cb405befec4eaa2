//! Retry policy for the request executor
//!
//! Transient failures (5xx, unexpected 4xx, transport errors) are retried a
//! bounded number of times with a short, by default constant, backoff.
//! Rate-limit signals are not counted here: they are waited out.

use crate::types::BackoffType;
use std::time::Duration;

/// How the executor retries and waits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive transient failures on one request before giving up
    pub max_transient_attempts: u32,
    /// Delay after the first transient failure
    pub transient_backoff: Duration,
    /// Upper bound for growing backoffs
    pub max_backoff: Duration,
    /// How the delay grows between attempts
    pub backoff_type: BackoffType,
    /// Extra sleep past a reset time before retrying
    pub reset_grace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_attempts: 3,
            transient_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
            backoff_type: BackoffType::Constant,
            reset_grace: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Set the attempt budget (at least one)
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_transient_attempts = attempts.max(1);
        self
    }

    /// Set backoff configuration
    #[must_use]
    pub fn with_backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff_type = backoff_type;
        self.transient_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the grace period added to reset times
    #[must_use]
    pub fn with_reset_grace(mut self, grace: Duration) -> Self {
        self.reset_grace = grace;
        self
    }

    /// Delay after the given zero-based failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.transient_backoff,
            BackoffType::Linear => self.transient_backoff.saturating_mul(attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.transient_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.max_backoff)
    }
}
