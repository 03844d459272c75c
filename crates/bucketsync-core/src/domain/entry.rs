//! File entries and per-side mappings
//!
//! A [`SideMapping`] is the snapshot of one side of a comparison (the local
//! tree or the remote listing) keyed by [`RelativePath`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Fingerprint, RelativePath};

/// Which side of a comparison an entry was enumerated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Metadata of one file on one side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the sync root or remote prefix
    pub path: RelativePath,
    /// Size in bytes
    pub size: u64,
    /// Content digest; `None` when it was not computed (large remote objects
    /// without a reusable ETag)
    pub fingerprint: Option<Fingerprint>,
    /// Local mtime or provider-reported last-modified time
    pub modified: DateTime<Utc>,
}

impl FileEntry {
    pub fn new(
        path: RelativePath,
        size: u64,
        fingerprint: Option<Fingerprint>,
        modified: DateTime<Utc>,
    ) -> Self {
        Self {
            path,
            size,
            fingerprint,
            modified,
        }
    }
}

/// Snapshot of one side, keyed by relative path
///
/// Backed by a `BTreeMap` so iteration is ordered by path; the planner relies
/// on this for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideMapping {
    entries: BTreeMap<RelativePath, FileEntry>,
}

impl SideMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry for the same path
    pub fn insert(&mut self, entry: FileEntry) -> Option<FileEntry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    pub fn get(&self, path: &RelativePath) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in path order
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    /// Iterate paths in order
    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.entries.keys()
    }
}

impl FromIterator<FileEntry> for SideMapping {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        let mut mapping = SideMapping::new();
        for entry in iter {
            mapping.insert(entry);
        }
        mapping
    }
}
