use std::time::Duration;

use rand::Rng;

use crate::models::{FetchOutcome, Identifier};
use crate::traits::RecordFetcher;

/// Retry configuration with exponential backoff and jitter.
///
/// Delay before retry `n` (0-indexed): `base * 2^n + uniform(0, jitter)`,
/// capped at `max_delay`. With the defaults: ~1s, ~2s, ~4s, ...
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base: Duration,
    pub jitter: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic part of the backoff after the failed attempt `attempt_index`.
    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt_index.min(31));
        self.base.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff including random jitter in `[0, jitter)`.
    fn backoff(&self, attempt_index: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            self.jitter.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
        };
        self.delay_for_attempt(attempt_index) + jitter
    }
}

/// Final result of a retried fetch.
#[derive(Debug)]
pub struct Attempted {
    pub outcome: FetchOutcome,
    pub attempts: u32,
}

/// Wraps a [`RecordFetcher`] with bounded retry of transient failures.
#[derive(Clone)]
pub struct RetryPolicy<F> {
    fetcher: F,
    config: RetryConfig,
}

impl<F: RecordFetcher> RetryPolicy<F> {
    pub fn new(fetcher: F, config: RetryConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Fetch `id`, retrying transient failures up to `max_attempts` total attempts.
    ///
    /// `Success`, `Empty` and `Fatal` return immediately. When every attempt
    /// fails transiently the last failure is returned as the terminal outcome.
    pub async fn fetch_with_retry(&self, id: Identifier, max_attempts: u32) -> Attempted {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let outcome = self.fetcher.fetch(id).await;
            attempt += 1;

            if !outcome.is_transient() {
                return Attempted {
                    outcome,
                    attempts: attempt,
                };
            }
            let error = outcome.error_message().unwrap_or_default();

            if attempt >= max_attempts {
                tracing::warn!(%id, attempts = attempt, %error, "Giving up after retries");
                return Attempted {
                    outcome,
                    attempts: attempt,
                };
            }

            let delay = self.config.backoff(attempt - 1);
            tracing::debug!(
                %id,
                attempt,
                %error,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
