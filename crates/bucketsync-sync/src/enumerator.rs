//! Tree enumeration
//!
//! Produces one [`SideMapping`] per side of a sync target:
//!
//! - **Local**: every regular file under the root, fingerprinted. Files that
//!   vanish or become unreadable between the walk and hashing are left out
//!   and reported as warnings.
//! - **Remote**: every object under the prefix, across all listing pages.
//!   Folder markers (keys ending in `/`) are ignored. A plain single-part
//!   ETag is reused as the fingerprint; otherwise objects up to the hashing
//!   threshold are downloaded and hashed, and larger ones are compared by
//!   size and timestamp.
//!
//! Failure to read the local root or to list the remote prefix aborts the
//! enumeration with a [`SyncError`].

use std::collections::HashSet;
use std::sync::Arc;

use bucketsync_core::domain::{FileEntry, RelativePath, RemotePrefix, Side, SideMapping, SyncPath};
use bucketsync_core::ports::{ILocalFileSystem, IObjectStore, ObjectInfo};
use tracing::{debug, info, instrument, warn};

use crate::fingerprint::{fingerprint_bytes, fingerprint_from_etag};
use crate::SyncError;

/// Default size limit for downloading remote objects to hash them
pub const DEFAULT_REMOTE_HASH_THRESHOLD: u64 = 16 * 1024 * 1024;

/// One side's entries plus the entries that were skipped while building it
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub mapping: SideMapping,
    pub warnings: Vec<String>,
}

/// Builds [`Snapshot`]s of the local tree and the remote prefix
#[derive(Clone)]
pub struct TreeEnumerator {
    fs: Arc<dyn ILocalFileSystem>,
    remote_hash_threshold: u64,
}

impl TreeEnumerator {
    pub fn new(fs: Arc<dyn ILocalFileSystem>, remote_hash_threshold: u64) -> Self {
        Self {
            fs,
            remote_hash_threshold,
        }
    }

    /// Enumerate every regular file under `root`
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the root does not exist, is not a
    /// directory, or cannot be listed
    #[instrument(skip(self), fields(root = %root))]
    pub async fn enumerate_local(&self, root: &SyncPath) -> Result<Snapshot, SyncError> {
        let io_error = |message: String| SyncError::Io {
            path: root.as_path().to_path_buf(),
            message,
        };

        let state = self
            .fs
            .get_state(root)
            .await
            .map_err(|e| io_error(format!("{e:#}")))?;
        if !state.exists {
            return Err(io_error("local root does not exist".to_string()));
        }
        if !state.is_directory() {
            return Err(io_error("local root is not a directory".to_string()));
        }

        let walk = self
            .fs
            .walk_files(root)
            .await
            .map_err(|e| io_error(format!("{e:#}")))?;

        let mut snapshot = Snapshot {
            mapping: SideMapping::new(),
            warnings: walk.warnings,
        };

        for file in walk.files {
            let absolute = root.join_relative(&file.path);
            match self.fs.compute_fingerprint(&absolute).await {
                Ok(fingerprint) => {
                    snapshot.mapping.insert(FileEntry::new(
                        file.path,
                        file.size,
                        Some(fingerprint),
                        file.modified,
                    ));
                }
                Err(e) => {
                    warn!(path = %file.path, error = %e, "Skipping unreadable file");
                    snapshot
                        .warnings
                        .push(format!("unreadable file {}: {e:#}", file.path));
                }
            }
        }

        info!(
            files = snapshot.mapping.len(),
            warnings = snapshot.warnings.len(),
            "Local tree enumerated"
        );
        Ok(snapshot)
    }

    /// Enumerate every object under `prefix` in `bucket`
    ///
    /// # Errors
    /// Returns [`SyncError::Enumeration`] if a listing page or a hashing
    /// download fails, or if the store repeats a continuation token
    #[instrument(skip(self, store), fields(bucket = %bucket, prefix = %prefix))]
    pub async fn enumerate_remote(
        &self,
        store: &dyn IObjectStore,
        bucket: &str,
        prefix: &RemotePrefix,
    ) -> Result<Snapshot, SyncError> {
        let location = format!("{bucket}/{prefix}");
        let enumeration_error = |message: String| SyncError::Enumeration {
            side: Side::Remote,
            location: location.clone(),
            message,
        };

        let mut snapshot = Snapshot::default();
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = store
                .list_objects(bucket, prefix.as_str(), continuation.as_deref())
                .await
                .map_err(|e| enumeration_error(format!("{e:#}")))?;
            pages += 1;

            for object in page.objects {
                if let Some(entry) = self
                    .remote_entry(store, bucket, prefix, object, &mut snapshot.warnings)
                    .await
                    .map_err(|e| enumeration_error(format!("{e:#}")))?
                {
                    snapshot.mapping.insert(entry);
                }
            }

            match page.next_continuation {
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(enumeration_error(format!(
                            "listing repeated continuation token '{token}'"
                        )));
                    }
                    continuation = Some(token);
                }
                None => break,
            }
        }

        info!(
            objects = snapshot.mapping.len(),
            pages,
            warnings = snapshot.warnings.len(),
            "Remote prefix enumerated"
        );
        Ok(snapshot)
    }

    async fn remote_entry(
        &self,
        store: &dyn IObjectStore,
        bucket: &str,
        prefix: &RemotePrefix,
        object: ObjectInfo,
        warnings: &mut Vec<String>,
    ) -> anyhow::Result<Option<FileEntry>> {
        if object.is_folder_marker() {
            debug!(key = %object.key, "Ignoring folder marker");
            return Ok(None);
        }

        let Some(rest) = prefix.strip(&object.key) else {
            warnings.push(format!("key '{}' is outside prefix '{prefix}'", object.key));
            return Ok(None);
        };
        let path = match RelativePath::new(rest) {
            Ok(path) => path,
            Err(err) => {
                warn!(key = %object.key, %err, "Skipping key with no local equivalent");
                warnings.push(format!("skipped key '{}': {err}", object.key));
                return Ok(None);
            }
        };

        let fingerprint = match object.etag.as_deref().and_then(fingerprint_from_etag) {
            Some(fingerprint) => Some(fingerprint),
            None if object.size <= self.remote_hash_threshold => {
                debug!(key = %object.key, size = object.size, "Downloading to fingerprint");
                let data = store.get_object(bucket, &object.key).await?;
                Some(fingerprint_bytes(&data))
            }
            None => {
                debug!(
                    key = %object.key,
                    size = object.size,
                    "Object above hashing threshold; comparing by size and timestamp"
                );
                None
            }
        };

        Ok(Some(FileEntry::new(
            path,
            object.size,
            fingerprint,
            object.last_modified,
        )))
    }
}

#[cfg(test)]
mod tests {
    use bucketsync_core::ports::ObjectPage;
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::filesystem::LocalFileSystemAdapter;
    use crate::memory::InMemoryObjectStore;

    fn enumerator(threshold: u64) -> TreeEnumerator {
        TreeEnumerator::new(Arc::new(LocalFileSystemAdapter::new()), threshold)
    }

    fn root(dir: &TempDir) -> SyncPath {
        SyncPath::new(dir.path().to_path_buf()).unwrap()
    }

    fn rel(p: &str) -> RelativePath {
        RelativePath::new(p).unwrap()
    }

    #[tokio::test]
    async fn test_local_entries_are_fingerprinted() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/a.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();

        let snapshot = enumerator(DEFAULT_REMOTE_HASH_THRESHOLD)
            .enumerate_local(&root(&dir))
            .await
            .unwrap();

        assert_eq!(snapshot.mapping.len(), 2);
        let a = snapshot.mapping.get(&rel("docs/a.txt")).unwrap();
        assert_eq!(a.size, 5);
        assert_eq!(a.fingerprint, Some(fingerprint_bytes(b"hello")));
        assert!(snapshot.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = SyncPath::new(dir.path().join("nope")).unwrap();

        let result = enumerator(0).enumerate_local(&missing).await;
        match result {
            Err(SyncError::Io { path, .. }) => assert_eq!(path, dir.path().join("nope")),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_root_that_is_a_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file"), "x").unwrap();
        let file_root = SyncPath::new(dir.path().join("file")).unwrap();

        let result = enumerator(0).enumerate_local(&file_root).await;
        assert!(matches!(result, Err(SyncError::Io { .. })));
    }

    #[tokio::test]
    async fn test_remote_reuses_single_part_etag() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "p/a.txt", "hello");
        store.insert("b", "p/", "");
        store.insert("b", "other/x.txt", "x");

        let snapshot = enumerator(0)
            .enumerate_remote(&store, "b", &RemotePrefix::new("p").unwrap())
            .await
            .unwrap();

        let paths: Vec<_> = snapshot.mapping.paths().map(|p| p.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
        assert_eq!(
            snapshot.mapping.get(&rel("a.txt")).unwrap().fingerprint,
            Some(fingerprint_bytes(b"hello"))
        );
    }

    #[tokio::test]
    async fn test_remote_multipart_below_threshold_is_downloaded() {
        let store = InMemoryObjectStore::new();
        store.insert_with_etag(
            "b",
            "big.bin",
            "content",
            Utc::now(),
            Some("\"0123456789abcdef0123456789abcdef-3\"".to_string()),
        );

        let snapshot = enumerator(1024)
            .enumerate_remote(&store, "b", &RemotePrefix::root())
            .await
            .unwrap();

        assert_eq!(
            snapshot.mapping.get(&rel("big.bin")).unwrap().fingerprint,
            Some(fingerprint_bytes(b"content"))
        );
    }

    #[tokio::test]
    async fn test_remote_above_threshold_has_no_fingerprint() {
        let store = InMemoryObjectStore::new();
        store.insert_with_etag("b", "big.bin", "content", Utc::now(), None);

        let snapshot = enumerator(3)
            .enumerate_remote(&store, "b", &RemotePrefix::root())
            .await
            .unwrap();

        let entry = snapshot.mapping.get(&rel("big.bin")).unwrap();
        assert_eq!(entry.size, 7);
        assert!(entry.fingerprint.is_none());
    }

    #[tokio::test]
    async fn test_remote_drains_every_page() {
        let store = InMemoryObjectStore::new().with_page_size(2);
        for i in 0..7 {
            store.insert("b", &format!("f{i}.txt"), format!("{i}"));
        }

        let snapshot = enumerator(0)
            .enumerate_remote(&store, "b", &RemotePrefix::root())
            .await
            .unwrap();
        assert_eq!(snapshot.mapping.len(), 7);
    }

    #[tokio::test]
    async fn test_remote_invalid_keys_become_warnings() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "a//b.txt", "x");
        store.insert("b", "ok.txt", "y");

        let snapshot = enumerator(0)
            .enumerate_remote(&store, "b", &RemotePrefix::root())
            .await
            .unwrap();
        assert_eq!(snapshot.mapping.len(), 1);
        assert_eq!(snapshot.warnings.len(), 1);
    }

    struct LoopingStore;

    #[async_trait::async_trait]
    impl IObjectStore for LoopingStore {
        async fn list_objects(
            &self,
            _bucket: &str,
            _prefix: &str,
            _continuation: Option<&str>,
        ) -> anyhow::Result<ObjectPage> {
            Ok(ObjectPage {
                objects: Vec::new(),
                next_continuation: Some("same".to_string()),
            })
        }
        async fn get_object(&self, _bucket: &str, _key: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("unused")
        }
        async fn put_object(&self, _b: &str, _k: &str, _d: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("unused")
        }
        async fn delete_object(&self, _bucket: &str, _key: &str) -> anyhow::Result<()> {
            anyhow::bail!("unused")
        }
    }

    #[tokio::test]
    async fn test_repeated_continuation_token_is_an_error() {
        let result = enumerator(0)
            .enumerate_remote(&LoopingStore, "b", &RemotePrefix::root())
            .await;
        match result {
            Err(SyncError::Enumeration { side, message, .. }) => {
                assert_eq!(side, Side::Remote);
                assert!(message.contains("same"));
            }
            other => panic!("expected Enumeration error, got {other:?}"),
        }
    }
}
