//! Retry with exponential backoff for board write calls

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::defaults::*;
use crate::errors::{BoardError, BoardResult};

/// Up to 25% extra delay
const JITTER_PERCENT: u64 = 25;

/// Backoff policy for a single failing board call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

/// Result of a retried call plus how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: BoardResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Fixed, jitter-free delays; handy in tests
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponential = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let delay_ms = exponential.min(self.max_delay.as_millis() as f64) as u64;

        let jitter = if self.jitter {
            jitter_ms(delay_ms * JITTER_PERCENT / 100)
        } else {
            0
        };
        Duration::from_millis(delay_ms + jitter)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BoardResult<T>>,
    {
        let total = self.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            "Board operation '{}' succeeded on attempt {}/{}",
                            operation_name, attempt, total
                        );
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= total {
                warn!(
                    "Board operation '{}' failed after {} attempt(s): {}",
                    operation_name, attempt, error
                );
                return Attempted {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            let delay = match &error {
                BoardError::RateLimited { retry_after_secs } => self
                    .delay_for(attempt)
                    .max(Duration::from_secs(*retry_after_secs)),
                _ => self.delay_for(attempt),
            };
            warn!(
                "Board operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                operation_name, attempt, total, delay, error
            );
            sleep(delay).await;
        }
    }
}

/// Pseudo-random 0..=max from the clock; good enough to spread retries
fn jitter_ms(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    (nanos % (max as u128 + 1)) as u64
}
