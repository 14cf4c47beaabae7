use std::future::Future;

use crate::error::AppError;
use crate::models::{FetchOutcome, Identifier, Snapshot};

/// Performs one request/response cycle for one identifier.
///
/// Implementations never return `Err`: every failure is folded into a
/// [`FetchOutcome`] so the caller can decide whether to retry.
pub trait RecordFetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, id: Identifier) -> impl Future<Output = FetchOutcome> + Send;
}

/// Persists checkpoint snapshots (the export collaborator).
///
/// Implementations must treat the snapshot as read-only.
pub trait CheckpointSink: Send + Sync + 'static {
    /// Validate the destination before any work starts.
    fn prepare(&self) -> Result<(), AppError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), AppError>;
}

/// A sink that discards every snapshot, for runs that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CheckpointSink for NullSink {
    fn prepare(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<(), AppError> {
        Ok(())
    }
}
