use std::time::Duration;

use rangefetch_core::testutil::{MockSink, ScriptedFetcher, Step};
use rangefetch_core::{CheckpointKind, Orchestrator, RunConfig};
use tokio_util::sync::CancellationToken;

use crate::integration::common::test_config;

fn evens_found() -> ScriptedFetcher {
    ScriptedFetcher::new(|id, _| if id % 2 == 0 { Step::Success } else { Step::Empty })
}

#[tokio::test(start_paused = true)]
async fn evens_are_found_for_any_worker_count() {
    for workers in [1, 2, 5, 16] {
        let sink = MockSink::new();
        let orchestrator =
            Orchestrator::new(test_config(1, 100, workers), evens_found(), sink.clone());

        let summary = orchestrator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.successes, 50, "workers = {workers}");
        assert_eq!(summary.errors, 0, "workers = {workers}");
        assert_eq!(summary.completed, 100);

        let last = sink.last().unwrap();
        assert_eq!(last.kind, CheckpointKind::Final);
        let mut ids: Vec<_> = last.records.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=50).map(|n| n * 2).collect::<Vec<_>>());
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_within_attempt_budget() {
    let fetcher = ScriptedFetcher::new(|id, attempt| match (id, attempt) {
        (7, 1 | 2) => Step::Transient,
        (7, _) => Step::Success,
        _ => Step::Empty,
    });
    let config = test_config(1, 10, 3).with_max_attempts(3);
    let orchestrator = Orchestrator::new(config, fetcher.clone(), MockSink::new());

    let summary = orchestrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(fetcher.attempts_for(7), 3);

    let snapshot = orchestrator.results().snapshot(CheckpointKind::Final);
    assert_eq!(snapshot.records[0].id, 7);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_one_error_record() {
    let fetcher = ScriptedFetcher::new(|id, _| if id == 42 { Step::Transient } else { Step::Empty });
    let config = test_config(40, 45, 2).with_max_attempts(2);
    let orchestrator = Orchestrator::new(config, fetcher.clone(), MockSink::new());

    let summary = orchestrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.successes, 0);
    assert_eq!(fetcher.attempts_for(42), 2);

    let snapshot = orchestrator.results().snapshot(CheckpointKind::Final);
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].id, 42);
    assert!(snapshot.records.iter().all(|r| r.id != 42));
}

#[tokio::test(start_paused = true)]
async fn fatal_failures_are_not_retried() {
    let fetcher = ScriptedFetcher::new(|id, _| if id == 3 { Step::Fatal } else { Step::Success });
    let orchestrator = Orchestrator::new(test_config(1, 5, 2), fetcher.clone(), MockSink::new());

    let summary = orchestrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.successes, 4);
    assert_eq!(summary.errors, 1);
    assert_eq!(fetcher.attempts_for(3), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_bounds_extra_attempts() {
    let workers = 4;
    let max_attempts = 3;
    let fetcher = ScriptedFetcher::new(|_, _| Step::Transient).with_latency(Duration::from_secs(1));
    let sink = MockSink::new();
    let config = test_config(1, 500, workers)
        .with_max_attempts(max_attempts)
        .with_grace_period(Duration::from_secs(120));
    let orchestrator = Orchestrator::new(config, fetcher.clone(), sink.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let observer = fetcher.clone();
    let at_cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        trigger.cancel();
        observer.total_attempts()
    });

    let summary = orchestrator.run(cancel).await.unwrap();
    let attempts_at_cancel = at_cancel.await.unwrap();
    let extra = fetcher.total_attempts() - attempts_at_cancel;

    assert!(summary.cancelled);
    assert!(summary.discarded > 0);
    assert!(
        extra <= (workers as u64) * u64::from(max_attempts),
        "{extra} attempts after cancellation"
    );
    assert_eq!(sink.count(CheckpointKind::Final), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_run_over_explicit_ids() {
    let config = RunConfig::for_ids(vec![10, 3, 8])
        .with_workers(2)
        .with_rate(rangefetch_core::RateConfig::fixed(Duration::from_millis(10)));
    let orchestrator = Orchestrator::new(config, evens_found(), MockSink::new());

    let summary = orchestrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.seeded, 3);
    assert_eq!(summary.successes, 2);
}
