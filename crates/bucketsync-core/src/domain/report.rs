//! Batch results
//!
//! [`SyncResult`] holds the counters of one batch; [`BatchReport`] adds
//! the per-path failures, bidirectional conflicts and enumeration warnings
//! a caller needs to explain the outcome.

use serde::{Deserialize, Serialize};

use super::newtypes::{BatchId, RelativePath};
use super::operation::{OperationKind, SyncOperation};

/// Counters of one batch
///
/// Counters only ever increase while a batch runs; the value handed out
/// at batch end is a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub uploaded: u64,
    pub downloaded: u64,
    pub deleted: u64,
    pub skipped: u64,
}

impl SyncResult {
    /// Count a successfully completed operation
    pub fn record(&mut self, operation: &SyncOperation) {
        match operation {
            SyncOperation::Upload(_) => self.uploaded += 1,
            SyncOperation::Download(_) => self.downloaded += 1,
            SyncOperation::DeleteLocal(_) | SyncOperation::DeleteRemote(_) => self.deleted += 1,
            SyncOperation::Skip(_) => self.skipped += 1,
        }
    }

    /// Number of operations that changed either side
    pub fn changed(&self) -> u64 {
        self.uploaded + self.downloaded + self.deleted
    }

    /// Number of operations counted
    pub fn total(&self) -> u64 {
        self.changed() + self.skipped
    }
}

/// A single failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub path: RelativePath,
    pub operation: OperationKind,
    pub message: String,
}

impl std::fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' failed: {}", self.operation, self.path, self.message)
    }
}

/// Outcome of one enumerate -> plan -> execute run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub result: SyncResult,
    /// One entry per operation that reached `Failed`
    pub failures: Vec<TransferFailure>,
    /// Paths left untouched because both sides changed at the same instant
    pub conflicts: Vec<RelativePath>,
    /// Entries skipped during enumeration (unreadable files)
    pub warnings: Vec<String>,
    /// Operations never dispatched because the batch was cancelled
    pub not_dispatched: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    /// Returns true when every planned operation completed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.not_dispatched == 0
    }
}
