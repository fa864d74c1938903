use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RequestConfig;
use crate::error::TransportError;
use crate::executor::RawResponse;

const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Bounded retries for server errors.
///
/// Only a response with status 500 or above is retried. Transport failures
/// (timeouts, refused connections, DNS) are returned to the caller after the
/// first attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    retry_delay: Duration,
}

impl RetryPolicy {
    pub const fn disabled() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    pub const fn new(max_retries: usize, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_config(config: &RequestConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    pub const fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    pub const fn is_retryable_status(status: u16) -> bool {
        status >= 500
    }

    /// Delay before the retry that follows attempt `attempt_index` (0-based).
    pub fn backoff_for_retry(&self, attempt_index: usize) -> Duration {
        if !self.retry_delay.is_zero() {
            return self.retry_delay;
        }
        let exponent = attempt_index.min(31) as u32;
        let base_ms = BASE_BACKOFF.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(1_u64 << exponent)
            .min(MAX_BACKOFF.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt_index: usize,
    pub elapsed: Duration,
    pub last_status: Option<u16>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Calls `attempt_fn` until it yields a non-5xx response, fails at the
    /// transport level, or the retries are used up. Sleeps between attempts
    /// on the calling thread.
    pub fn run<F>(&self, mut attempt_fn: F) -> Result<RawResponse, TransportError>
    where
        F: FnMut(&RetryAttempt) -> Result<RawResponse, TransportError>,
    {
        let started_at = Instant::now();
        let mut attempt = RetryAttempt {
            attempt_index: 0,
            elapsed: Duration::ZERO,
            last_status: None,
        };

        loop {
            let response = attempt_fn(&attempt)?;
            if !RetryPolicy::is_retryable_status(response.status)
                || attempt.attempt_index >= self.policy.max_retries
            {
                return Ok(response);
            }

            let delay = self.policy.backoff_for_retry(attempt.attempt_index);
            warn!(
                status = response.status,
                attempt = attempt.attempt_index + 1,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "retrying request after server error"
            );
            if !delay.is_zero() {
                sleep(delay);
            }

            attempt = RetryAttempt {
                attempt_index: attempt.attempt_index + 1,
                elapsed: started_at.elapsed(),
                last_status: Some(response.status),
            };
        }
    }
}
