use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::models::{CheckpointKind, ErrorRecord, Snapshot, SuccessRecord};

#[derive(Debug, Default)]
struct Collections {
    records: Vec<SuccessRecord>,
    errors: Vec<ErrorRecord>,
}

/// Append-only store for success and error records shared by all workers.
///
/// Snapshots copy the collections; taking one never clears anything, so
/// periodic checkpoints can run as often as needed.
#[derive(Clone, Default)]
pub struct ResultAccumulator {
    inner: Arc<Mutex<Collections>>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned result accumulator");
            poisoned.into_inner()
        })
    }

    /// Append a record. Returns the number of records found so far.
    pub fn push_record(&self, record: SuccessRecord) -> usize {
        let mut inner = self.lock();
        inner.records.push(record);
        inner.records.len()
    }

    /// Append an error. Returns the number of errors so far.
    pub fn push_error(&self, error: ErrorRecord) -> usize {
        let mut inner = self.lock();
        inner.errors.push(error);
        inner.errors.len()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    pub fn error_count(&self) -> usize {
        self.lock().errors.len()
    }

    /// Read-only copy of both collections, stamped with the current time.
    pub fn snapshot(&self, kind: CheckpointKind) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            kind,
            taken_at: Utc::now(),
            records: inner.records.clone(),
            errors: inner.errors.clone(),
        }
    }
}
