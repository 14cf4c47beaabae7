//! Run lifecycle: seed, run the pool, checkpoint, finalize.
//!
//! # States
//!
//! ```text
//! IDLE --> SEEDING --> RUNNING --[source exhausted]-----------------> FINALIZING --> DONE
//!  |                      |                                             ^  ^
//!  |                      +--[cancel / checkpoint failure]--> DRAINING -+  |
//!  +--[checkpoint destination unusable]------------------------------------+
//! ```
//!
//! `Finalizing` runs exactly once on every path and always saves one last
//! checkpoint.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::accumulator::ResultAccumulator;
use crate::config::{RunConfig, Seed};
use crate::error::AppError;
use crate::models::{CheckpointKind, RunSummary};
use crate::pacing::PacedFetcher;
use crate::rate::RateController;
use crate::retry::RetryPolicy;
use crate::task_source::TaskSource;
use crate::traits::{CheckpointSink, RecordFetcher};
use crate::worker::{PoolProgress, TracingWorkerReporter, WorkerPool, WorkerReporter};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Seeding,
    Running,
    Draining,
    Finalizing,
    Done,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Seeding => "seeding",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Owns one sweep over the configured identifiers.
pub struct Orchestrator<F, S, R = TracingWorkerReporter> {
    config: RunConfig,
    fetcher: PacedFetcher<F>,
    sink: Arc<S>,
    reporter: Arc<R>,
    results: ResultAccumulator,
    state: watch::Sender<RunState>,
}

impl<F, S> Orchestrator<F, S, TracingWorkerReporter>
where
    F: RecordFetcher,
    S: CheckpointSink,
{
    pub fn new(config: RunConfig, fetcher: F, sink: S) -> Self {
        Self::with_reporter(config, fetcher, sink, TracingWorkerReporter)
    }
}

impl<F, S, R> Orchestrator<F, S, R>
where
    F: RecordFetcher,
    S: CheckpointSink,
    R: WorkerReporter + 'static,
{
    pub fn with_reporter(config: RunConfig, fetcher: F, sink: S, reporter: R) -> Self {
        let controller = RateController::new(config.rate.clone());
        Self {
            fetcher: PacedFetcher::new(fetcher, controller),
            config,
            sink: Arc::new(sink),
            reporter: Arc::new(reporter),
            results: ResultAccumulator::new(),
            state: watch::channel(RunState::Idle).0,
        }
    }

    pub fn results(&self) -> &ResultAccumulator {
        &self.results
    }

    pub fn rate_controller(&self) -> &RateController {
        self.fetcher.controller()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn transition(&self, next: RunState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(run_id = %self.config.run_id, from = %previous, to = %next, "Run state changed");
    }

    /// Run to completion or until `cancel` fires.
    ///
    /// Task failures never end the run. Only an unusable checkpoint
    /// destination does, and even then a final checkpoint is attempted.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, AppError> {
        self.config.validate()?;
        if let Err(e) = self.sink.prepare() {
            tracing::error!(error = %e, "Checkpoint destination unusable, not starting");
            self.finalize_after_setup_failure().await;
            return Err(e);
        }

        self.transition(RunState::Seeding);
        let source = TaskSource::new();
        let seeded = match &self.config.seed {
            Seed::Range { start, end } => source.seed_range(*start, *end),
            Seed::Ids(ids) => source.seed(ids.iter().copied()),
        };
        tracing::info!(
            run_id = %self.config.run_id,
            seeded,
            workers = self.config.workers,
            max_attempts = self.config.retry.max_attempts,
            "Starting run"
        );

        let stop = cancel.child_token();
        let policy = RetryPolicy::new(self.fetcher.clone(), self.config.retry.clone());
        let mut pool = WorkerPool::spawn(
            self.config.workers,
            source.clone(),
            policy,
            self.results.clone(),
            stop.clone(),
            self.reporter.clone(),
        );
        self.transition(RunState::Running);

        let mut checkpoints = tokio::time::interval_at(
            Instant::now() + self.config.checkpoint_interval,
            self.config.checkpoint_interval,
        );
        checkpoints.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness = tokio::time::interval(self.config.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut progress_log = ProgressLog::new(seeded);
        let mut last_fingerprint: Option<String> = None;
        let mut fatal: Option<AppError> = None;

        let interrupted = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(run_id = %self.config.run_id, "Cancellation requested");
                    break true;
                }
                _ = checkpoints.tick() => {
                    if let Err(e) = self.periodic_checkpoint(&mut last_fingerprint).await {
                        tracing::error!(error = %e, "Checkpoint failed, stopping run");
                        fatal = Some(e);
                        break true;
                    }
                }
                _ = liveness.tick() => {
                    progress_log.maybe_log(
                        pool.progress(),
                        &self.results,
                        self.config.progress_interval,
                    );
                    if pool.is_idle() {
                        break false;
                    }
                }
            }
        };

        let mut discarded = 0;
        if interrupted {
            self.transition(RunState::Draining);
            stop.cancel();
            discarded = source.drain();
            let outcome = pool.join_with_grace(self.config.grace_period).await;
            tracing::info!(
                discarded,
                stopped = outcome.reports.len(),
                aborted = outcome.aborted,
                "Workers drained"
            );
        } else {
            pool.join().await;
        }

        self.transition(RunState::Finalizing);
        let saved = self.save(CheckpointKind::Final).await;
        self.transition(RunState::Done);

        let summary = RunSummary {
            seeded,
            completed: pool.progress().completed(),
            attempts: pool.progress().attempts(),
            successes: self.results.record_count(),
            errors: self.results.error_count(),
            cancelled: interrupted,
            discarded,
        };
        tracing::info!(
            run_id = %self.config.run_id,
            completed = summary.completed,
            found = summary.successes,
            errors = summary.errors,
            cancelled = summary.cancelled,
            "Run finished"
        );

        if let Some(e) = fatal {
            if let Err(final_err) = saved {
                tracing::error!(error = %final_err, "Final checkpoint failed as well");
            }
            return Err(e);
        }
        saved?;
        Ok(summary)
    }

    /// Best-effort final checkpoint when the run never got going.
    async fn finalize_after_setup_failure(&self) {
        self.transition(RunState::Finalizing);
        if let Err(e) = self.save(CheckpointKind::Final).await {
            tracing::error!(error = %e, "Final checkpoint failed as well");
        }
        self.transition(RunState::Done);
    }

    /// Save a periodic checkpoint unless nothing changed since the last one.
    async fn periodic_checkpoint(
        &self,
        last_fingerprint: &mut Option<String>,
    ) -> Result<(), AppError> {
        let snapshot = self.results.snapshot(CheckpointKind::Periodic);
        let fingerprint = snapshot.fingerprint()?;
        if last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            tracing::debug!("Results unchanged since last checkpoint, skipping");
            return Ok(());
        }
        self.save_snapshot(snapshot).await?;
        *last_fingerprint = Some(fingerprint);
        Ok(())
    }

    async fn save(&self, kind: CheckpointKind) -> Result<(), AppError> {
        self.save_snapshot(self.results.snapshot(kind)).await
    }

    async fn save_snapshot(&self, snapshot: crate::models::Snapshot) -> Result<(), AppError> {
        let sink = self.sink.clone();
        let kind = snapshot.kind;
        let records = snapshot.records.len();
        let errors = snapshot.errors.len();

        tokio::task::spawn_blocking(move || sink.save(&snapshot))
            .await
            .map_err(|e| AppError::ExportError(format!("checkpoint task failed: {e}")))??;

        tracing::info!(%kind, records, errors, "Checkpoint saved");
        Ok(())
    }
}

/// Rate-limited progress lines: attempts completed and records found.
struct ProgressLog {
    total: usize,
    last_completed: u64,
    last_logged: Option<Instant>,
}

impl ProgressLog {
    fn new(total: usize) -> Self {
        Self {
            total,
            last_completed: 0,
            last_logged: None,
        }
    }

    fn maybe_log(
        &mut self,
        progress: &PoolProgress,
        results: &ResultAccumulator,
        every: std::time::Duration,
    ) {
        let completed = progress.completed();
        if completed == self.last_completed {
            return;
        }
        if self.last_logged.is_some_and(|t| t.elapsed() < every) {
            return;
        }
        tracing::info!(
            completed,
            total = self.total,
            attempts = progress.attempts(),
            found = results.record_count(),
            errors = results.error_count(),
            "Progress"
        );
        self.last_completed = completed;
        self.last_logged = Some(Instant::now());
    }
}
