//! bucketsync Sync - Folder to bucket synchronization engine
//!
//! Provides:
//! - Content fingerprints and ETag reuse
//! - Local tree and remote listing enumeration
//! - Diff planning for one-way and bidirectional policies
//! - Bounded-concurrency task execution with progress events
//! - Debounced watch sessions and their registry
//!
//! ## Modules
//!
//! - [`engine`] - `sync_once` orchestration: enumerate, plan, execute
//! - [`executor`] - Task scheduler with a concurrency cap and delete-after-transfer ordering
//! - [`registry`] - Process-wide table of watch sessions
//! - [`session`] - Watch loop state machine
//! - [`filesystem`] - Local filesystem adapter (atomic writes, MD5 fingerprints)
//! - [`memory`] - In-memory object store

pub mod engine;
pub mod enumerator;
pub mod events;
pub mod executor;
pub mod filesystem;
pub mod fingerprint;
pub mod memory;
pub mod planner;
pub mod registry;
pub mod session;
pub mod watcher;

use std::path::PathBuf;

use bucketsync_core::domain::{DomainError, ProfileId, RelativePath, SessionId, Side};
use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local path is missing or unreadable; aborts the batch before any operation runs
    #[error("I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Listing one side failed; aborts the batch before any operation runs
    #[error("Failed to enumerate {side} entries of {location}: {message}")]
    Enumeration {
        side: Side,
        location: String,
        message: String,
    },

    /// A single operation failed; recorded per path, the batch continues
    #[error("Transfer failed for '{path}': {message}")]
    Transfer { path: RelativePath, message: String },

    /// The file-event subscription could not be set up; the session never starts
    #[error("Cannot watch {path}: {message}")]
    Subscription { path: PathBuf, message: String },

    /// No object store could be built for the profile
    #[error("Cannot open storage profile '{profile}': {message}")]
    Store { profile: ProfileId, message: String },

    /// Session registry rejected the request
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A domain-level error propagated from bucketsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
}

/// Errors returned by the session registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No active session with this id (unknown, or already stopping)
    #[error("No active watch session with id {0}")]
    NotFound(SessionId),

    /// Another active session already watches this directory
    #[error("Directory {path} is already watched by session {existing}")]
    AlreadyWatching { path: PathBuf, existing: SessionId },
}
