//! Sync operations, directions and planning options

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RelativePath;

// ============================================================================
// SyncDirection
// ============================================================================

/// Which side is the source of truth for a reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local tree is the source for existence and content
    #[default]
    LocalToRemote,
    /// Remote prefix is the source for existence and content
    RemoteToLocal,
    /// Entries missing on one side are copied; newer timestamp wins on conflict
    Bidirectional,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::LocalToRemote => write!(f, "local_to_remote"),
            SyncDirection::RemoteToLocal => write!(f, "remote_to_local"),
            SyncDirection::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

impl FromStr for SyncDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_to_remote" => Ok(SyncDirection::LocalToRemote),
            "remote_to_local" => Ok(SyncDirection::RemoteToLocal),
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            _ => Err(DomainError::InvalidDirection(s.to_string())),
        }
    }
}

/// Planner input besides the two snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    pub direction: SyncDirection,
    /// Delete destination entries that have no source counterpart.
    /// Ignored for [`SyncDirection::Bidirectional`].
    pub delete_orphans: bool,
}

impl PlanOptions {
    pub fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            delete_orphans: false,
        }
    }

    #[must_use]
    pub fn with_delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }
}

// ============================================================================
// SyncOperation
// ============================================================================

/// Discriminant of a [`SyncOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
    Skip,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Upload => write!(f, "upload"),
            OperationKind::Download => write!(f, "download"),
            OperationKind::DeleteLocal => write!(f, "delete_local"),
            OperationKind::DeleteRemote => write!(f, "delete_remote"),
            OperationKind::Skip => write!(f, "skip"),
        }
    }
}

/// One planned action for one relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum SyncOperation {
    Upload(RelativePath),
    Download(RelativePath),
    DeleteLocal(RelativePath),
    DeleteRemote(RelativePath),
    Skip(RelativePath),
}

impl SyncOperation {
    pub fn path(&self) -> &RelativePath {
        match self {
            SyncOperation::Upload(p)
            | SyncOperation::Download(p)
            | SyncOperation::DeleteLocal(p)
            | SyncOperation::DeleteRemote(p)
            | SyncOperation::Skip(p) => p,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            SyncOperation::Upload(_) => OperationKind::Upload,
            SyncOperation::Download(_) => OperationKind::Download,
            SyncOperation::DeleteLocal(_) => OperationKind::DeleteLocal,
            SyncOperation::DeleteRemote(_) => OperationKind::DeleteRemote,
            SyncOperation::Skip(_) => OperationKind::Skip,
        }
    }

    /// Returns true for uploads and downloads
    pub fn is_transfer(&self) -> bool {
        matches!(self, SyncOperation::Upload(_) | SyncOperation::Download(_))
    }

    /// Returns true for local and remote deletions
    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            SyncOperation::DeleteLocal(_) | SyncOperation::DeleteRemote(_)
        )
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}
