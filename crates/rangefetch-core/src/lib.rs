pub mod accumulator;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pacing;
pub mod rate;
pub mod retry;
pub mod task_source;
pub mod testutil;
pub mod traits;
pub mod worker;

pub use accumulator::ResultAccumulator;
pub use config::{RunConfig, Seed};
pub use error::AppError;
pub use models::{
    CheckpointKind, ErrorRecord, FetchOutcome, Identifier, RunSummary, Snapshot, SuccessRecord,
};
pub use orchestrator::{Orchestrator, RunState};
pub use rate::{RateConfig, RateController};
pub use retry::{RetryConfig, RetryPolicy};
pub use task_source::TaskSource;
pub use traits::{CheckpointSink, NullSink, RecordFetcher};
pub use worker::{TracingWorkerReporter, WorkerEvent, WorkerPool, WorkerReporter};
