use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Longest server-requested delay we honour
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
        }
    }
}

/// What the operation reported about a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again, optionally no sooner than the given delay
    Retry { at_least: Option<Duration> },
    Stop,
}

/// The last error once the policy gives up
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff before attempt `attempt + 1`, given that `attempt` (1-based) failed
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(exponent)
                .min(self.max_backoff_ms),
        )
    }

    /// Run `op` until it succeeds, `decide` says stop, or attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, D>(&self, mut op: F, decide: D) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        D: Fn(&E) -> RetryDecision,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let at_least = match decide(&error) {
                RetryDecision::Retry { at_least } if attempt < attempts => at_least,
                _ => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
            };

            let cap = Duration::from_secs(MAX_RETRY_AFTER_SECS);
            let delay = self.backoff(attempt).max(at_least.unwrap_or_default().min(cap));
            warn!(
                "Attempt {}/{} failed: {} (retrying in {:?})",
                attempt, attempts, error, delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
