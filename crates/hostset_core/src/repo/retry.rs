//! Bounded retry with exponential backoff for membership transactions.
//!
//! # Invariants
//! - The closure is invoked at most `max_attempts` times.
//! - Non-retryable errors are returned on the attempt that produced them.
//! - Exhausting the bound yields `MembershipError::Conflict` wrapping the last
//!   retryable cause.

use crate::config::RepositoryConfig;
use crate::repo::error::{MembershipError, MembershipResult};
use log::warn;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RepositoryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            base_delay: Duration::from_millis(config.base_backoff_ms()),
            max_delay: Duration::from_millis(config.max_backoff_ms()),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Doubles per attempt starting from `base_delay`, capped at `max_delay`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1_u32 << shift);
        delay.min(self.max_delay)
    }

    /// Runs `attempt_fn` until it succeeds, fails with a non-retryable error,
    /// or the attempt bound is reached.
    ///
    /// Returns the value together with the number of attempts used.
    pub fn run<T>(
        &self,
        op: &'static str,
        set_id: &str,
        mut attempt_fn: impl FnMut(u32) -> MembershipResult<T>,
    ) -> MembershipResult<(T, u32)> {
        let mut attempt = 1;
        loop {
            match attempt_fn(attempt) {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "event={op} module=repo status=retry set_id={set_id} attempt={attempt} max_attempts={} delay_ms={} error_code={}",
                        self.max_attempts,
                        delay.as_millis(),
                        err.code()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(MembershipError::Conflict {
                        set_id: set_id.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
