//! Exponential backoff for blocking calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    #[serde(with = "duration_millis")]
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff.
    #[serde(with = "duration_millis")]
    pub max_backoff: Duration,
    /// Multiplier applied after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Backoff to wait after the `attempt`-th failure (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Last error after the retry budget ran out.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds, fails with a non-retriable error, or the
/// attempt ceiling is reached.
///
/// `retry_delay` returns `None` for errors that must not be retried, otherwise
/// the least the error asks us to wait (e.g. a server's `Retry-After`); the
/// actual sleep is the larger of that and the policy's backoff.
///
/// `on_retry` is called with the attempt number, the error, and the wait
/// about to be slept; it exists so callers can log.
pub fn retry_with_backoff<T, E>(
    policy: &RetryPolicy,
    retry_delay: impl Fn(&E) -> Option<Duration>,
    mut on_retry: impl FnMut(u32, &E, Duration),
    mut operation: impl FnMut() -> Result<T, E>,
) -> Result<T, RetryExhausted<E>> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match retry_delay(&err) {
            Some(floor) if attempt < max_attempts => {
                let wait = policy.backoff_after(attempt).max(floor);
                on_retry(attempt, &err, wait);
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            }
            _ => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                })
            }
        }
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
