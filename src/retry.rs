//! Bounded retry with delay and optional backoff
//!
//! Used for media join, the single delayed stream-subscribe retry, upload
//! retries and the signaling reconnect loop.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
            max_delay: delay,
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: initial,
            backoff: 2.0,
            max_delay: initial.saturating_mul(16),
        }
    }

    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay to wait before attempt `attempt` (1-based; attempt 1 has none)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let cap = self.max_delay.max(self.delay);
        let factor = self.backoff.powi(attempt.saturating_sub(2).min(i32::MAX as u32) as i32);
        // Large attempt counts overflow Duration long before the cap matters
        Duration::try_from_secs_f64(self.delay.as_secs_f64() * factor)
            .map(|delay| delay.min(cap))
            .unwrap_or(cap)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is exhausted. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> SessionResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SessionResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    warn!(
                        "{} failed ({}), retrying in {:?} (attempt {}/{})",
                        label, e, delay, attempt, self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Convenience for callers that only care about retryable transport errors
pub fn transport_error(err: impl std::fmt::Display) -> SessionError {
    SessionError::TransportUnavailable(err.to_string())
}
