use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Integer key naming one remote entity.
pub type Identifier = u64;

/// Raw row returned by the API for one identifier.
///
/// The shape of `data` belongs to the remote API; the core only cares that it exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub id: Identifier,
    pub data: serde_json::Value,
}

impl SuccessRecord {
    pub fn new(id: Identifier, data: serde_json::Value) -> Self {
        Self { id, data }
    }
}

/// Terminal failure for one identifier, kept for a targeted re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Identifier,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(id: Identifier, error: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Classified result of one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The API returned a row for the identifier.
    Success(SuccessRecord),
    /// The request worked but the API has nothing for this identifier.
    Empty,
    /// Timeout, connection failure or non-2xx status.
    Transient(AppError),
    /// Malformed body or anything unclassified.
    Fatal(AppError),
}

impl FetchOutcome {
    /// Classify an error by its retryability.
    pub fn from_error(error: AppError) -> Self {
        if error.is_retryable() {
            FetchOutcome::Transient(error)
        } else {
            FetchOutcome::Fatal(error)
        }
    }

    /// True when the server produced a usable answer, data or not.
    ///
    /// This is what the rate controller counts as a success.
    pub fn is_usable_response(&self) -> bool {
        matches!(self, FetchOutcome::Success(_) | FetchOutcome::Empty)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchOutcome::Transient(_))
    }

    /// Description of the failure, if this outcome is one.
    pub fn error_message(&self) -> Option<String> {
        match self {
            FetchOutcome::Transient(e) | FetchOutcome::Fatal(e) => Some(e.to_string()),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Transient(_) => "transient",
            FetchOutcome::Fatal(_) => "fatal",
        }
    }
}

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Periodic,
    Final,
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::Periodic => write!(f, "periodic"),
            CheckpointKind::Final => write!(f, "final"),
        }
    }
}

/// Point-in-time, read-only copy of everything accumulated so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub kind: CheckpointKind,
    pub taken_at: DateTime<Utc>,
    pub records: Vec<SuccessRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.errors.is_empty()
    }

    /// SHA-256 over the records and errors (not the timestamp), as 64-char hex.
    ///
    /// Two snapshots with the same content share a fingerprint.
    pub fn fingerprint(&self) -> Result<String, AppError> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.records)?);
        hasher.update(serde_json::to_vec(&self.errors)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub seeded: usize,
    pub completed: u64,
    /// Network attempts, retries included.
    pub attempts: u64,
    pub successes: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub discarded: usize,
}
