//! Domain entities and business logic
//!
//! This module contains the core domain types for bucketsync:
//! - Newtypes for identifiers, paths, prefixes and fingerprints
//! - File entries and per-side snapshots
//! - Sync operations, directions and results
//! - Task and watch-session state machines
//! - Engine events
//! - Domain-specific error types

pub mod entry;
pub mod errors;
pub mod events;
pub mod newtypes;
pub mod operation;
pub mod report;
pub mod session;
pub mod target;
pub mod task;

// Re-export commonly used types
pub use entry::{FileEntry, Side, SideMapping};
pub use errors::DomainError;
pub use events::{CompletedEvent, ErrorEvent, EventOrigin, ProgressEvent, SyncEvent};
pub use newtypes::*;
pub use operation::{OperationKind, PlanOptions, SyncDirection, SyncOperation};
pub use report::{BatchReport, SyncResult, TransferFailure};
pub use session::{SessionState, SessionSummary};
pub use target::SyncTarget;
pub use task::{Task, TaskState};
