//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface for interacting with the local
//! filesystem: walking the sync root, reading/writing whole files and
//! computing content fingerprints.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - File watching is not part of this trait; it is provided by the
//!   notify-based `FileWatcher` in `bucketsync-sync`, which hands out a
//!   channel of change events.

use chrono::{DateTime, Utc};

use crate::domain::newtypes::{Fingerprint, RelativePath, SyncPath};

// ============================================================================
// FileSystemState struct
// ============================================================================

/// Snapshot of a path's state on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSystemState {
    /// Whether the file/directory exists on disk
    pub exists: bool,
    /// Whether this is a regular file (false for directories and other types)
    pub is_file: bool,
    /// Size in bytes (0 for directories or non-existent files)
    pub size: u64,
    /// Last modification time (None if not available or file doesn't exist)
    pub modified: Option<DateTime<Utc>>,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if the file exists and is a regular file
    pub fn is_regular_file(&self) -> bool {
        self.exists && self.is_file
    }

    /// Returns true if the path exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.exists && !self.is_file
    }
}

// ============================================================================
// Walk results
// ============================================================================

/// A regular file found while walking the sync root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileInfo {
    pub path: RelativePath,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Result of a recursive walk
///
/// Entries that could not be read are not fatal; they are reported in
/// `warnings` with the offending path.
#[derive(Debug, Clone, Default)]
pub struct LocalWalk {
    pub files: Vec<LocalFileInfo>,
    pub warnings: Vec<String>,
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// ## Implementation Notes
///
/// - All paths are `SyncPath` instances, which are guaranteed to be absolute.
/// - `compute_fingerprint` must produce the same digest as the engine computes
///   for in-memory bytes so local and remote entries compare equal.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Recursively lists the regular files under `root`
    ///
    /// The root itself, directories, symlinks and special files are not
    /// returned.
    ///
    /// # Errors
    /// Returns an error if `root` does not exist or is not a directory
    async fn walk_files(&self, root: &SyncPath) -> anyhow::Result<LocalWalk>;

    /// Reads the entire contents of a file
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>>;

    /// Writes data to a file atomically, creating parent directories
    ///
    /// If the file already exists, its contents are replaced.
    async fn write_file(&self, path: &SyncPath, data: &[u8]) -> anyhow::Result<()>;

    /// Deletes a file
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be deleted
    async fn delete_file(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Gets the current state of a file or directory
    ///
    /// Returns `FileSystemState::not_found()` if the path doesn't exist
    /// (does not return an error for missing paths).
    async fn get_state(&self, path: &SyncPath) -> anyhow::Result<FileSystemState>;

    /// Computes the content fingerprint of a file
    async fn compute_fingerprint(&self, path: &SyncPath) -> anyhow::Result<Fingerprint>;

    /// Creates a directory and all parent directories as needed
    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()>;
}
