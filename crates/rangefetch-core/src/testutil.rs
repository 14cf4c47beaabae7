//! Test utilities: scripted fetchers, recording sinks and reporters.
//!
//! Handwritten mocks for dependency injection in unit and integration tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::{CheckpointKind, FetchOutcome, Identifier, Snapshot, SuccessRecord};
use crate::traits::{CheckpointSink, RecordFetcher};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// ScriptedFetcher
// ---------------------------------------------------------------------------

/// What a [`ScriptedFetcher`] answers for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Success,
    Empty,
    Transient,
    Fatal,
}

type Script = dyn Fn(Identifier, u32) -> Step + Send + Sync;

/// Fetcher driven by a closure of `(id, attempt)`, attempt being 1-based per id.
///
/// Success rows look like `{"id": <id>}`.
#[derive(Clone)]
pub struct ScriptedFetcher {
    script: Arc<Script>,
    latency: Duration,
    attempts: Arc<Mutex<HashMap<Identifier, u32>>>,
}

impl ScriptedFetcher {
    pub fn new(script: impl Fn(Identifier, u32) -> Step + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            latency: Duration::ZERO,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Simulated time spent on the wire per attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn attempts_for(&self, id: Identifier) -> u32 {
        self.attempts.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u64 {
        self.attempts
            .lock()
            .unwrap()
            .values()
            .map(|&n| u64::from(n))
            .sum()
    }
}

impl RecordFetcher for ScriptedFetcher {
    async fn fetch(&self, id: Identifier) -> FetchOutcome {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(id).or_insert(0);
            *n += 1;
            *n
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match (self.script)(id, attempt) {
            Step::Success => {
                FetchOutcome::Success(SuccessRecord::new(id, serde_json::json!({ "id": id })))
            }
            Step::Empty => FetchOutcome::Empty,
            Step::Transient => {
                FetchOutcome::Transient(AppError::NetworkError(format!("reset on {id}")))
            }
            Step::Fatal => {
                FetchOutcome::Fatal(AppError::MalformedResponse(format!("garbage for {id}")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Sink that records every snapshot it is handed.
#[derive(Clone, Default)]
pub struct MockSink {
    pub saved: Arc<Mutex<Vec<Snapshot>>>,
    prepare_error: Arc<Mutex<Option<AppError>>>,
    save_error: Arc<Mutex<Option<AppError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose destination is unusable from the start.
    pub fn with_prepare_error(error: AppError) -> Self {
        let sink = Self::default();
        *sink.prepare_error.lock().unwrap() = Some(error);
        sink
    }

    /// Sink whose next save fails once.
    pub fn with_save_error(error: AppError) -> Self {
        let sink = Self::default();
        *sink.save_error.lock().unwrap() = Some(error);
        sink
    }

    /// Also fail the next save once.
    pub fn and_save_error(self, error: AppError) -> Self {
        *self.save_error.lock().unwrap() = Some(error);
        self
    }

    pub fn count(&self, kind: CheckpointKind) -> usize {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    pub fn last(&self) -> Option<Snapshot> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl CheckpointSink for MockSink {
    fn prepare(&self) -> Result<(), AppError> {
        match self.prepare_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        self.saved.lock().unwrap().push(snapshot.clone());
        match self.save_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == label)
            .count()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::TaskClaimed { .. } => "TaskClaimed",
            WorkerEvent::TaskSucceeded { .. } => "TaskSucceeded",
            WorkerEvent::TaskEmpty { .. } => "TaskEmpty",
            WorkerEvent::TaskFailed { .. } => "TaskFailed",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
