use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::Identifier;
use crate::rate::RateConfig;
use crate::retry::RetryConfig;

/// Where a run's identifiers come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// Every identifier in `[start, end]`.
    Range { start: Identifier, end: Identifier },
    /// An explicit list, e.g. the identifiers of a previous error log.
    Ids(Vec<Identifier>),
}

impl Seed {
    pub fn len(&self) -> usize {
        match self {
            Seed::Range { start, end } if start <= end => ((end - start) as usize).saturating_add(1),
            Seed::Range { .. } => 0,
            Seed::Ids(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything fixed for the duration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: String,
    pub seed: Seed,
    pub workers: usize,
    pub retry: RetryConfig,
    pub rate: RateConfig,
    /// Time between periodic checkpoints.
    pub checkpoint_interval: Duration,
    /// How often the orchestrator checks whether workers are still alive.
    pub liveness_interval: Duration,
    /// Minimum time between two progress log lines.
    pub progress_interval: Duration,
    /// How long in-flight workers may keep going after cancellation.
    pub grace_period: Duration,
}

impl RunConfig {
    pub fn for_range(start: Identifier, end: Identifier) -> Self {
        Self::with_seed(Seed::Range { start, end })
    }

    pub fn for_ids(ids: Vec<Identifier>) -> Self {
        Self::with_seed(Seed::Ids(ids))
    }

    fn with_seed(seed: Seed) -> Self {
        Self {
            run_id: format!("run-{}", &Uuid::new_v4().to_string()[..8]),
            seed,
            workers: 5,
            retry: RetryConfig::default(),
            rate: RateConfig::default(),
            checkpoint_interval: Duration::from_secs(3600),
            liveness_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(30),
            grace_period: Duration::from_secs(5),
        }
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = id.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate(mut self, rate: RateConfig) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Reject configurations the run cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.seed {
            Seed::Range { start, end } => {
                if *start == 0 {
                    return Err(AppError::ConfigError(
                        "identifier range must start at 1 or above".into(),
                    ));
                }
                if start > end {
                    return Err(AppError::ConfigError(format!(
                        "invalid identifier range: start {start} is after end {end}"
                    )));
                }
            }
            Seed::Ids(ids) => {
                if ids.contains(&0) {
                    return Err(AppError::ConfigError(
                        "identifiers must be positive".into(),
                    ));
                }
            }
        }

        if self.seed.is_empty() {
            return Err(AppError::ConfigError("no identifiers to fetch".into()));
        }
        if self.workers == 0 {
            return Err(AppError::ConfigError("workers must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "max attempts must be at least 1".into(),
            ));
        }
        if self.rate.min_interval > self.rate.max_interval {
            return Err(AppError::ConfigError(format!(
                "pacing bounds are inverted: min {:?} > max {:?}",
                self.rate.min_interval, self.rate.max_interval
            )));
        }
        for (name, value) in [
            ("checkpoint interval", self.checkpoint_interval),
            ("liveness interval", self.liveness_interval),
        ] {
            if value.is_zero() {
                return Err(AppError::ConfigError(format!("{name} must be positive")));
            }
        }

        Ok(())
    }
}
