//! Events emitted while batches and sessions run
//!
//! Every batch emits any number of [`SyncEvent::Progress`] events followed
//! by exactly one terminal event: [`SyncEvent::Completed`] when the batch
//! ran (even with per-operation failures) or [`SyncEvent::Error`] when it
//! was aborted before executing anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{BatchId, RelativePath, SessionId};
use super::operation::OperationKind;
use super::report::{SyncResult, TransferFailure};
use super::task::TaskState;
use super::target::SyncTarget;

/// Identifies which batch (and session, for watch-triggered batches) an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventOrigin {
    pub batch_id: BatchId,
    pub session_id: Option<SessionId>,
}

impl EventOrigin {
    /// Origin for a one-shot batch
    pub fn batch(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            session_id: None,
        }
    }

    /// Origin for a batch triggered by a watch session
    pub fn session(batch_id: BatchId, session_id: SessionId) -> Self {
        Self {
            batch_id,
            session_id: Some(session_id),
        }
    }
}

impl std::fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.session_id {
            Some(session) => write!(f, "session {} batch {}", session, self.batch_id),
            None => write!(f, "batch {}", self.batch_id),
        }
    }
}

/// One task state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub origin: EventOrigin,
    /// Number of tasks that reached a terminal state so far
    pub current_index: usize,
    pub total: usize,
    pub current_path: RelativePath,
    pub operation: OperationKind,
    pub task_state: TaskState,
}

/// Terminal event of a batch that executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEvent {
    pub origin: EventOrigin,
    pub result: SyncResult,
    pub failures: Vec<TransferFailure>,
    pub finished_at: DateTime<Utc>,
}

/// Terminal event of a batch aborted before any operation ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub origin: EventOrigin,
    /// Names the path or session the failure is attributed to
    pub message: String,
}

/// Everything observable on the engine's event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    SessionStarted {
        session_id: SessionId,
        target: SyncTarget,
    },
    SessionStopped {
        session_id: SessionId,
    },
    Progress(ProgressEvent),
    Completed(CompletedEvent),
    Error(ErrorEvent),
}

impl SyncEvent {
    /// Returns the origin for batch-scoped events
    pub fn origin(&self) -> Option<&EventOrigin> {
        match self {
            SyncEvent::Progress(e) => Some(&e.origin),
            SyncEvent::Completed(e) => Some(&e.origin),
            SyncEvent::Error(e) => Some(&e.origin),
            SyncEvent::SessionStarted { .. } | SyncEvent::SessionStopped { .. } => None,
        }
    }

    /// Returns true for the single terminal event of a batch
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncEvent::Completed(_) | SyncEvent::Error(_))
    }
}
