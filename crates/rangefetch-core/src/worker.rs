use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::accumulator::ResultAccumulator;
use crate::models::{ErrorRecord, FetchOutcome, Identifier};
use crate::retry::RetryPolicy;
use crate::task_source::TaskSource;
use crate::traits::RecordFetcher;

/// Events emitted by workers for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: usize,
    },
    TaskClaimed {
        worker_id: usize,
        id: Identifier,
    },
    TaskSucceeded {
        worker_id: usize,
        id: Identifier,
        found: usize,
    },
    TaskEmpty {
        worker_id: usize,
        id: Identifier,
    },
    TaskFailed {
        worker_id: usize,
        id: Identifier,
        error: &'a str,
        attempts: u32,
    },
    Stopped {
        worker_id: usize,
        processed: u64,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::debug!(%worker_id, "Worker started");
            }
            WorkerEvent::TaskClaimed { worker_id, id } => {
                tracing::trace!(%worker_id, %id, "Task claimed");
            }
            WorkerEvent::TaskSucceeded {
                worker_id,
                id,
                found,
            } => {
                tracing::debug!(%worker_id, last_id = %id, %found, "Record found");
            }
            WorkerEvent::TaskEmpty { worker_id, id } => {
                tracing::trace!(%worker_id, %id, "No record");
            }
            WorkerEvent::TaskFailed {
                worker_id,
                id,
                error,
                attempts,
            } => {
                tracing::warn!(%worker_id, %id, %error, %attempts, "Task failed");
            }
            WorkerEvent::Stopped {
                worker_id,
                processed,
            } => {
                tracing::debug!(%worker_id, %processed, "Worker stopped");
            }
        }
    }
}

/// Counters shared by the pool and read by the orchestrator.
#[derive(Debug, Default)]
pub struct PoolProgress {
    completed: AtomicU64,
    attempts: AtomicU64,
}

impl PoolProgress {
    /// Tasks that reached a terminal outcome.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Network attempts made, retries included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub processed: u64,
}

/// How the pool ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    pub reports: Vec<WorkerReport>,
    /// Workers that had to be aborted after the grace period.
    pub aborted: usize,
}

struct WorkerContext<F> {
    source: TaskSource,
    policy: RetryPolicy<F>,
    results: ResultAccumulator,
    progress: Arc<PoolProgress>,
    active: Arc<AtomicUsize>,
    stop: CancellationToken,
    max_attempts: u32,
}

/// Decrements the live-worker count however the worker exits.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed set of workers draining one [`TaskSource`].
///
/// Each worker loops: dequeue, retried fetch, record, repeat. A worker stops
/// when the source is empty or when `stop` is cancelled; the token is only
/// checked between tasks, so an attempt in flight is never cut short.
pub struct WorkerPool {
    tasks: JoinSet<WorkerReport>,
    active: Arc<AtomicUsize>,
    progress: Arc<PoolProgress>,
}

impl WorkerPool {
    pub fn spawn<F, R>(
        size: usize,
        source: TaskSource,
        policy: RetryPolicy<F>,
        results: ResultAccumulator,
        stop: CancellationToken,
        reporter: Arc<R>,
    ) -> Self
    where
        F: RecordFetcher,
        R: WorkerReporter + 'static,
    {
        let active = Arc::new(AtomicUsize::new(size));
        let progress = Arc::new(PoolProgress::default());
        let max_attempts = policy.config().max_attempts;
        let ctx = Arc::new(WorkerContext {
            source,
            policy,
            results,
            progress: progress.clone(),
            active: active.clone(),
            stop,
            max_attempts,
        });

        let mut tasks = JoinSet::new();
        for worker_id in 0..size {
            tasks.spawn(run_worker(worker_id, ctx.clone(), reporter.clone()));
        }

        Self {
            tasks,
            active,
            progress,
        }
    }

    /// Number of workers still looping.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// True once every worker has observed an empty source (or stopped).
    pub fn is_idle(&self) -> bool {
        self.active() == 0
    }

    pub fn progress(&self) -> &Arc<PoolProgress> {
        &self.progress
    }

    /// Wait for every worker to finish on its own.
    pub async fn join(&mut self) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => outcome.reports.push(report),
                Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            }
        }
        outcome
    }

    /// Give workers `grace` to finish their current task, then abort the rest.
    pub async fn join_with_grace(&mut self, grace: Duration) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok(report))) => outcome.reports.push(report),
                Ok(Some(Err(e))) => tracing::error!(error = %e, "Worker task panicked"),
                Ok(None) => return outcome,
                Err(_) => break,
            }
        }

        outcome.aborted = self.tasks.len();
        tracing::warn!(
            aborted = outcome.aborted,
            grace_ms = grace.as_millis() as u64,
            "Grace period elapsed, aborting workers"
        );
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        outcome
    }
}

async fn run_worker<F, R>(
    worker_id: usize,
    ctx: Arc<WorkerContext<F>>,
    reporter: Arc<R>,
) -> WorkerReport
where
    F: RecordFetcher,
    R: WorkerReporter,
{
    let _guard = ActiveGuard(ctx.active.clone());
    reporter.report(WorkerEvent::Started { worker_id });
    let mut processed = 0;

    loop {
        if ctx.stop.is_cancelled() {
            break;
        }
        let Some(id) = ctx.source.try_next() else {
            break;
        };
        reporter.report(WorkerEvent::TaskClaimed { worker_id, id });

        let attempted = ctx.policy.fetch_with_retry(id, ctx.max_attempts).await;
        ctx.progress
            .attempts
            .fetch_add(u64::from(attempted.attempts), Ordering::Relaxed);

        match attempted.outcome {
            FetchOutcome::Success(record) => {
                let found = ctx.results.push_record(record);
                reporter.report(WorkerEvent::TaskSucceeded {
                    worker_id,
                    id,
                    found,
                });
            }
            FetchOutcome::Empty => {
                reporter.report(WorkerEvent::TaskEmpty { worker_id, id });
            }
            FetchOutcome::Transient(e) | FetchOutcome::Fatal(e) => {
                let error = e.to_string();
                ctx.results.push_error(ErrorRecord::new(id, error.as_str()));
                reporter.report(WorkerEvent::TaskFailed {
                    worker_id,
                    id,
                    error: &error,
                    attempts: attempted.attempts,
                });
            }
        }

        ctx.progress.completed.fetch_add(1, Ordering::Relaxed);
        processed += 1;
    }

    reporter.report(WorkerEvent::Stopped {
        worker_id,
        processed,
    });
    WorkerReport {
        worker_id,
        processed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::testutil::{MockReporter, ScriptedFetcher, Step};

    fn pool_with(
        size: usize,
        source: TaskSource,
        fetcher: ScriptedFetcher,
        max_attempts: u32,
        results: ResultAccumulator,
        stop: CancellationToken,
        reporter: Arc<MockReporter>,
    ) -> WorkerPool {
        let policy = RetryPolicy::new(
            fetcher,
            RetryConfig::default().with_max_attempts(max_attempts),
        );
        WorkerPool::spawn(size, source, policy, results, stop, reporter)
    }

    #[tokio::test(start_paused = true)]
    async fn drains_source_and_records_outcomes() {
        let fetcher = ScriptedFetcher::new(|id, _| match id % 3 {
            0 => Step::Success,
            1 => Step::Empty,
            _ => Step::Fatal,
        });
        let results = ResultAccumulator::new();
        let reporter = Arc::new(MockReporter::new());
        let mut pool = pool_with(
            4,
            TaskSource::from_range(1, 30),
            fetcher,
            3,
            results.clone(),
            CancellationToken::new(),
            reporter.clone(),
        );

        let outcome = pool.join().await;
        assert_eq!(outcome.reports.len(), 4);
        assert_eq!(outcome.reports.iter().map(|r| r.processed).sum::<u64>(), 30);
        assert!(pool.is_idle());
        assert_eq!(pool.progress().completed(), 30);
        assert_eq!(results.record_count(), 10);
        assert_eq!(results.error_count(), 10);
        assert_eq!(reporter.count("Started"), 4);
        assert_eq!(reporter.count("Stopped"), 4);
        assert_eq!(reporter.count("TaskEmpty"), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_stops_immediately() {
        let reporter = Arc::new(MockReporter::new());
        let mut pool = pool_with(
            3,
            TaskSource::new(),
            ScriptedFetcher::new(|_, _| Step::Success),
            3,
            ResultAccumulator::new(),
            CancellationToken::new(),
            reporter.clone(),
        );
        let outcome = pool.join().await;
        assert!(outcome.reports.iter().all(|r| r.processed == 0));
        assert_eq!(reporter.count("TaskClaimed"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_checked_between_tasks() {
        let fetcher =
            ScriptedFetcher::new(|_, _| Step::Empty).with_latency(Duration::from_secs(1));
        let stop = CancellationToken::new();
        let source = TaskSource::from_range(1, 100);
        let mut pool = pool_with(
            2,
            source.clone(),
            fetcher.clone(),
            1,
            ResultAccumulator::new(),
            stop.clone(),
            Arc::new(MockReporter::new()),
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        stop.cancel();
        let outcome = pool.join().await;

        // Two workers, one task per second, the in-flight pair still completes.
        assert_eq!(fetcher.total_attempts(), 6);
        assert_eq!(pool.progress().completed(), 6);
        assert_eq!(outcome.aborted, 0);
        assert_eq!(source.len(), 94);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_period_aborts_stragglers() {
        let fetcher =
            ScriptedFetcher::new(|_, _| Step::Empty).with_latency(Duration::from_secs(60));
        let stop = CancellationToken::new();
        let mut pool = pool_with(
            3,
            TaskSource::from_range(1, 10),
            fetcher,
            1,
            ResultAccumulator::new(),
            stop.clone(),
            Arc::new(MockReporter::new()),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.cancel();
        let outcome = pool.join_with_grace(Duration::from_secs(2)).await;
        assert_eq!(outcome.aborted, 3);
        assert!(pool.is_idle());
    }
}
