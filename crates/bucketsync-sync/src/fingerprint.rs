//! Content fingerprints
//!
//! A fingerprint is the MD5 digest of a file's bytes, rendered as hex. MD5 is
//! used because S3-compatible stores report exactly this value as the ETag of
//! objects uploaded in a single part, so most remote entries can be compared
//! without downloading them.
//!
//! ## Comparison rules
//!
//! When both entries carry a fingerprint, they are equal iff the fingerprints
//! are equal ([`ChangeBasis::Fingerprint`]). When either side lacks one (a
//! multipart upload larger than the remote hashing threshold), the comparison
//! falls back to [`ChangeBasis::SizeAndTimestamp`]:
//!
//! - one-way sync: unchanged iff the sizes match and the destination is not
//!   older than the source ([`compare`]);
//! - bidirectional: unchanged iff the sizes and the timestamps both match
//!   ([`compare_symmetric`]); otherwise the planner copies the newer side.
//!
//! The basis used is returned with every comparison so callers can log it.

use std::path::Path;

use bucketsync_core::domain::{FileEntry, Fingerprint};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Read buffer used when hashing files
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How two entries were compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeBasis {
    /// Both sides had a content digest
    Fingerprint,
    /// At least one side had no digest; size and timestamps were used
    SizeAndTimestamp,
}

impl std::fmt::Display for ChangeBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeBasis::Fingerprint => write!(f, "fingerprint"),
            ChangeBasis::SizeAndTimestamp => write!(f, "size_and_timestamp"),
        }
    }
}

/// Outcome of comparing two entries for the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub unchanged: bool,
    pub basis: ChangeBasis,
}

/// Fingerprint of an in-memory buffer
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    digest_to_fingerprint(&Md5::digest(data))
}

/// Fingerprint of a file, streamed in fixed-size chunks
///
/// # Errors
/// Returns the underlying I/O error if the file cannot be opened or read
pub async fn fingerprint_file(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(digest_to_fingerprint(&hasher.finalize()))
}

fn digest_to_fingerprint(digest: &[u8]) -> Fingerprint {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(digest);
    Fingerprint::from_md5_digest(raw)
}

/// Reuses a provider ETag as a fingerprint when it is a plain content MD5
///
/// Surrounding quotes are stripped. Multipart ETags (`"<hex>-<parts>"`) are
/// an MD5 of part digests rather than of the content and yield `None`, as do
/// any other non-MD5 formats.
pub fn fingerprint_from_etag(etag: &str) -> Option<Fingerprint> {
    let trimmed = etag.trim().trim_matches('"');
    if trimmed.contains('-') {
        return None;
    }
    Fingerprint::new(trimmed).ok()
}

/// Compares a source entry against its destination counterpart
pub fn compare(source: &FileEntry, destination: &FileEntry) -> Comparison {
    match (&source.fingerprint, &destination.fingerprint) {
        (Some(a), Some(b)) => Comparison {
            unchanged: a == b,
            basis: ChangeBasis::Fingerprint,
        },
        _ => Comparison {
            unchanged: source.size == destination.size && destination.modified >= source.modified,
            basis: ChangeBasis::SizeAndTimestamp,
        },
    }
}

/// Compares two entries when neither side is the source
///
/// Without a digest on both sides a same-size edit is only visible through
/// its timestamp, so differing timestamps count as a change.
pub fn compare_symmetric(a: &FileEntry, b: &FileEntry) -> Comparison {
    match (&a.fingerprint, &b.fingerprint) {
        (Some(x), Some(y)) => Comparison {
            unchanged: x == y,
            basis: ChangeBasis::Fingerprint,
        },
        _ => Comparison {
            unchanged: a.size == b.size && a.modified == b.modified,
            basis: ChangeBasis::SizeAndTimestamp,
        },
    }
}

#[cfg(test)]
mod tests {
    use bucketsync_core::domain::RelativePath;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;

    fn entry(size: u64, fingerprint: Option<Fingerprint>, age_secs: i64) -> FileEntry {
        FileEntry::new(
            RelativePath::new("a.txt").unwrap(),
            size,
            fingerprint,
            Utc::now() - Duration::seconds(age_secs),
        )
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            fingerprint_bytes(b"").as_str(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            fingerprint_bytes(b"hello world").as_str(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn test_file_and_bytes_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one read buffer to exercise the chunked loop
        let content: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &content).unwrap();

        let from_file = fingerprint_file(&path).await.unwrap();
        assert_eq!(from_file, fingerprint_bytes(&content));
    }

    #[tokio::test]
    async fn test_fingerprint_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let result = fingerprint_file(&dir.path().join("missing")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_etag_with_quotes_is_reused() {
        let fp = fingerprint_from_etag("\"5EB63BBBE01EEED093CB22BB8F5ACDC3\"").unwrap();
        assert_eq!(fp, fingerprint_bytes(b"hello world"));
    }

    #[test]
    fn test_multipart_etag_is_not_reused() {
        assert!(fingerprint_from_etag("\"5eb63bbbe01eeed093cb22bb8f5acdc3-4\"").is_none());
    }

    #[test]
    fn test_non_md5_etag_is_not_reused() {
        assert!(fingerprint_from_etag("W/\"abc\"").is_none());
        assert!(fingerprint_from_etag("").is_none());
    }

    #[test]
    fn test_compare_by_fingerprint() {
        let x = fingerprint_bytes(b"X");
        let y = fingerprint_bytes(b"Y");

        let same = compare(&entry(1, Some(x.clone()), 10), &entry(1, Some(x.clone()), 100));
        assert_eq!(
            same,
            Comparison {
                unchanged: true,
                basis: ChangeBasis::Fingerprint
            }
        );

        let differs = compare(&entry(1, Some(x), 10), &entry(1, Some(y), 0));
        assert!(!differs.unchanged);
        assert_eq!(differs.basis, ChangeBasis::Fingerprint);
    }

    #[test]
    fn test_compare_fallback_requires_newer_destination() {
        let fp = Some(fingerprint_bytes(b"X"));

        // Destination written after the source was last modified
        let fresh = compare(&entry(5, fp.clone(), 60), &entry(5, None, 10));
        assert!(fresh.unchanged);
        assert_eq!(fresh.basis, ChangeBasis::SizeAndTimestamp);

        // Source modified after the destination copy was made
        let stale = compare(&entry(5, fp.clone(), 10), &entry(5, None, 60));
        assert!(!stale.unchanged);

        // Size change always counts as a change
        let resized = compare(&entry(5, fp, 60), &entry(6, None, 10));
        assert!(!resized.unchanged);
    }

    #[test]
    fn test_compare_symmetric_fallback_uses_size_and_timestamp() {
        let a = entry(5, None, 60);
        let mut b = entry(5, Some(fingerprint_bytes(b"hello")), 0);

        // Same size, different mtime: a same-size edit on one side
        let edited = compare_symmetric(&a, &b);
        assert!(!edited.unchanged);
        assert_eq!(edited.basis, ChangeBasis::SizeAndTimestamp);

        b.modified = a.modified;
        assert!(compare_symmetric(&a, &b).unchanged);

        let c = entry(4, None, 0);
        let mut d = entry(5, None, 0);
        d.modified = c.modified;
        assert!(!compare_symmetric(&c, &d).unchanged);
    }
}
