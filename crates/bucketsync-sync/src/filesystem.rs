//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Downloads are written to a temporary sibling and
//!   renamed into place, so a watcher or a concurrent walk never observes a
//!   half-written file under its final name.
//! - **Walks skip symlinks**: Only regular files are synchronized; symlinked
//!   files and directories are ignored rather than followed.
//! - **MD5 fingerprints**: Files are hashed in streaming chunks so large
//!   files do not have to fit in memory.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use bucketsync_core::{
    domain::newtypes::{Fingerprint, SyncPath},
    ports::local_filesystem::{FileSystemState, ILocalFileSystem, LocalFileInfo, LocalWalk},
};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::fingerprint::fingerprint_file;

/// Suffix of in-progress download files; never reported by walks
pub const TEMP_SUFFIX: &str = ".bucketsync-tmp";

// ============================================================================
// LocalFileSystemAdapter
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the [`SyncPath`] arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn walk_directory<'a>(
        &'a self,
        dir: PathBuf,
        root: &'a SyncPath,
        walk: &'a mut LocalWalk,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // The root itself must be readable; anything below it is best effort
                Err(e) if dir.as_path() == root.as_path() => {
                    return Err(e)
                        .with_context(|| format!("Failed to read directory: {}", dir.display()))
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                    walk.warnings
                        .push(format!("unreadable directory {}: {e}", dir.display()));
                    return Ok(());
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        walk.warnings
                            .push(format!("error listing {}: {e}", dir.display()));
                        break;
                    }
                };
                let entry_path = entry.path();

                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        walk.warnings
                            .push(format!("cannot stat {}: {e}", entry_path.display()));
                        continue;
                    }
                };

                if file_type.is_symlink() {
                    debug!(path = %entry_path.display(), "Skipping symlink");
                    continue;
                }

                if file_type.is_dir() {
                    self.walk_directory(entry_path, root, walk).await?;
                    continue;
                }

                if !file_type.is_file() {
                    continue;
                }
                if is_temp_file(&entry_path) {
                    // Never synced: either an interrupted download or a user file
                    // that collides with the reserved suffix
                    warn!(path = %entry_path.display(), "Skipping file with reserved suffix");
                    walk.warnings.push(format!(
                        "skipped {}: names ending in {TEMP_SUFFIX} are reserved for downloads",
                        entry_path.display()
                    ));
                    continue;
                }

                let relative = match root.relative_of(&entry_path) {
                    Ok(relative) => relative,
                    Err(err) => {
                        warn!(path = %entry_path.display(), %err, "Skipping invalid path");
                        walk.warnings
                            .push(format!("skipped {}: {err}", entry_path.display()));
                        continue;
                    }
                };

                match entry.metadata().await {
                    Ok(metadata) => walk.files.push(LocalFileInfo {
                        path: relative,
                        size: metadata.len(),
                        modified: metadata
                            .modified()
                            .map(DateTime::<Utc>::from)
                            .unwrap_or_else(|_| Utc::now()),
                    }),
                    Err(e) => walk
                        .warnings
                        .push(format!("cannot stat {}: {e}", entry_path.display())),
                }
            }

            Ok(())
        })
    }
}

fn is_temp_file(path: &std::path::Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMP_SUFFIX))
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(root = %root))]
    async fn walk_files(&self, root: &SyncPath) -> anyhow::Result<LocalWalk> {
        let mut walk = LocalWalk::default();
        self.walk_directory(root.as_path().to_path_buf(), root, &mut walk)
            .await?;

        // read_dir order is unspecified; callers expect path order
        walk.files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            files = walk.files.len(),
            warnings = walk.warnings.len(),
            "walk complete"
        );
        Ok(walk)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>> {
        debug!("reading file");
        let data = tokio::fs::read(path.as_path())
            .await
            .with_context(|| format!("Failed to read {path}"))?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn write_file(&self, path: &SyncPath, data: &[u8]) -> anyhow::Result<()> {
        let target = path.as_path();

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create parent of {path}"))?;
        }

        // Same directory as the target so the rename stays on one filesystem
        let tmp_path = {
            let mut p = target.as_os_str().to_owned();
            p.push(TEMP_SUFFIX);
            PathBuf::from(p)
        };

        debug!(?tmp_path, "writing to temporary file");
        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to write {path}"));
        }

        tokio::fs::rename(&tmp_path, target)
            .await
            .with_context(|| format!("Failed to move download into place at {path}"))?;

        debug!("write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete_file(&self, path: &SyncPath) -> anyhow::Result<()> {
        match tokio::fs::remove_file(path.as_path()).await {
            Ok(()) => {
                debug!("delete complete");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("already absent");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete {path}")),
        }
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get_state(&self, path: &SyncPath) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path.as_path()).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let is_file = metadata.is_file();
        let size = metadata.len();
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        debug!(exists = true, is_file, size, "state retrieved");

        Ok(FileSystemState {
            exists: true,
            is_file,
            size,
            modified,
        })
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn compute_fingerprint(&self, path: &SyncPath) -> anyhow::Result<Fingerprint> {
        let fingerprint = fingerprint_file(path.as_path())
            .await
            .with_context(|| format!("Failed to hash {path}"))?;
        debug!(fingerprint = %fingerprint, "fingerprint computed");
        Ok(fingerprint)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()> {
        debug!("creating directory");
        tokio::fs::create_dir_all(path.as_path())
            .await
            .with_context(|| format!("Failed to create directory {path}"))?;
        Ok(())
    }
}
