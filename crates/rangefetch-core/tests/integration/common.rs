use std::time::Duration;

use rangefetch_core::RunConfig;
use rangefetch_core::rate::RateConfig;
use rangefetch_core::retry::RetryConfig;

/// Run config with a short fixed pacing interval so paused-clock tests stay small.
pub fn test_config(start: u64, end: u64, workers: usize) -> RunConfig {
    RunConfig::for_range(start, end)
        .with_run_id("integration")
        .with_workers(workers)
        .with_rate(RateConfig::fixed(Duration::from_millis(10)))
        .with_retry(RetryConfig::default().with_jitter(Duration::ZERO))
}
