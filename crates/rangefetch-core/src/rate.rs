//! Adaptive request pacing shared by every worker.
//!
//! The controller keeps one pacing interval for the whole run. Usable
//! responses arriving in quick succession shrink it; repeated failures grow
//! it, and a burst of errors triggers a global cooldown.
//!
//! ```text
//! success: timeouts -= 1, errors -= 0.5, interval *= 0.9 if the last update was < 0.5s ago
//! failure: timeouts += 1, errors += 1,   interval *= 1.5 if timeouts > 2
//!          errors > 10  => sleep min(60, 5 * errors) with the lock held, then errors = 0
//! ```
//!
//! The cooldown keeps the state locked while it sleeps, so every worker
//! stalls at its next pacing or report call until it ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Tuning knobs for [`RateController`].
#[derive(Debug, Clone)]
pub struct RateConfig {
    pub initial_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Successes closer together than this shrink the interval.
    pub speedup_window: Duration,
    pub speedup_factor: f64,
    pub slowdown_factor: f64,
    /// Consecutive-ish timeouts tolerated before the interval grows.
    pub timeout_threshold: u32,
    /// Error score above which the cooldown fires.
    pub error_threshold: f64,
    /// How much one success takes off the error score.
    pub error_decay: f64,
    pub cooldown_per_error: Duration,
    pub max_cooldown: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(300),
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(5),
            speedup_window: Duration::from_millis(500),
            speedup_factor: 0.9,
            slowdown_factor: 1.5,
            timeout_threshold: 2,
            error_threshold: 10.0,
            error_decay: 0.5,
            cooldown_per_error: Duration::from_secs(5),
            max_cooldown: Duration::from_secs(60),
        }
    }
}

impl RateConfig {
    /// Fixed pacing: every request waits exactly `interval`.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            min_interval: interval,
            max_interval: interval,
            ..Default::default()
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }
}

#[derive(Debug)]
struct RateState {
    last_update: Instant,
    interval_secs: f64,
    timeout_count: u32,
    error_count: f64,
}

/// Observable copy of the pacing state.
#[derive(Debug, Clone, PartialEq)]
pub struct RateStats {
    pub interval: Duration,
    pub timeout_count: u32,
    pub error_count: f64,
    pub cooldowns: u64,
}

/// What a single [`RateController::report_outcome`] call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateUpdate {
    pub interval: Duration,
    /// Set when this report triggered the global cooldown.
    pub cooldown: Option<Duration>,
}

/// Thread-safe adaptive pacing shared by all workers.
#[derive(Clone)]
pub struct RateController {
    config: RateConfig,
    state: Arc<Mutex<RateState>>,
    cooldowns: Arc<AtomicU64>,
}

impl RateController {
    pub fn new(config: RateConfig) -> Self {
        let initial = config
            .initial_interval
            .max(config.min_interval)
            .min(config.max_interval)
            .as_secs_f64();
        Self {
            state: Arc::new(Mutex::new(RateState {
                last_update: Instant::now(),
                interval_secs: initial,
                timeout_count: 0,
                error_count: 0.0,
            })),
            config,
            cooldowns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Wait to apply before the next request.
    pub async fn next_delay(&self) -> Duration {
        let state = self.state.lock().await;
        Duration::from_secs_f64(state.interval_secs)
    }

    /// Feed one attempt's result back into the controller.
    ///
    /// `success` means the server gave a usable answer, whether or not it
    /// carried data.
    pub async fn report_outcome(&self, success: bool) -> RateUpdate {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let min = self.config.min_interval.as_secs_f64();
        let max = self.config.max_interval.as_secs_f64();
        let mut cooldown = None;

        if success {
            state.timeout_count = state.timeout_count.saturating_sub(1);
            state.error_count = (state.error_count - self.config.error_decay).max(0.0);

            if now.duration_since(state.last_update) < self.config.speedup_window {
                let next = (state.interval_secs * self.config.speedup_factor).max(min);
                if next != state.interval_secs {
                    tracing::debug!(interval_ms = (next * 1000.0) as u64, "Pacing sped up");
                }
                state.interval_secs = next;
            }
        } else {
            state.timeout_count += 1;
            state.error_count += 1.0;

            if state.timeout_count > self.config.timeout_threshold {
                let next = (state.interval_secs * self.config.slowdown_factor).min(max);
                if next != state.interval_secs {
                    tracing::debug!(
                        interval_ms = (next * 1000.0) as u64,
                        timeouts = state.timeout_count,
                        "Pacing slowed down"
                    );
                }
                state.interval_secs = next;
            }

            if state.error_count > self.config.error_threshold {
                let pause = self
                    .config
                    .cooldown_per_error
                    .mul_f64(state.error_count)
                    .min(self.config.max_cooldown);
                tracing::warn!(
                    errors = state.error_count,
                    pause_secs = pause.as_secs_f64(),
                    "Too many errors, cooling down"
                );
                self.cooldowns.fetch_add(1, Ordering::Relaxed);
                // Lock stays held: all workers wait out the cooldown.
                tokio::time::sleep(pause).await;
                state.error_count = 0.0;
                cooldown = Some(pause);
            }
        }

        // Refreshed on every report, not only on success.
        state.last_update = now;
        state.interval_secs = state.interval_secs.max(min).min(max);

        RateUpdate {
            interval: Duration::from_secs_f64(state.interval_secs),
            cooldown,
        }
    }

    pub async fn stats(&self) -> RateStats {
        let state = self.state.lock().await;
        RateStats {
            interval: Duration::from_secs_f64(state.interval_secs),
            timeout_count: state.timeout_count,
            error_count: state.error_count,
            cooldowns: self.cooldowns.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateController {
    fn default() -> Self {
        Self::new(RateConfig::default())
    }
}
