//! Object store port (driven/secondary port)
//!
//! This module defines the interface for S3-compatible object storage. The
//! sync engine never talks to a storage API directly; it only calls these
//! four primitives.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific;
//!   the engine attributes them to a path before reporting.
//! - Listing is paginated by the store. Callers that need a full snapshot must
//!   keep calling [`IObjectStore::list_objects`] until `next_continuation` is `None`.
//! - Listing is recursive (no delimiter): every key under the prefix is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::ProfileId;

// ============================================================================
// Listing DTOs
// ============================================================================

/// Metadata of one stored object as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Full object key including the prefix
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Provider-reported last modification time
    pub last_modified: DateTime<Utc>,
    /// Entity tag as returned by the provider (may be quoted)
    pub etag: Option<String>,
}

impl ObjectInfo {
    /// Returns true for zero-content keys representing an (empty) folder
    pub fn is_folder_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    /// Token to pass to the next call; `None` on the last page
    pub next_continuation: Option<String>,
}

// ============================================================================
// IObjectStore trait
// ============================================================================

/// Port trait for object storage operations
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Lists one page of objects under `prefix`
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `prefix` - Key prefix (empty for the whole bucket)
    /// * `continuation` - Token from the previous page, `None` for the first page
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> anyhow::Result<ObjectPage>;

    /// Downloads the full content of an object
    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>>;

    /// Uploads `data` as the full content of an object, replacing any previous content
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> anyhow::Result<()>;

    /// Deletes an object
    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()>;
}

// ============================================================================
// IStoreResolver trait
// ============================================================================

/// Resolves a storage profile to a connected object store
///
/// Credential storage is outside the engine; implementations decide where
/// endpoint and credentials come from.
#[async_trait::async_trait]
pub trait IStoreResolver: Send + Sync {
    /// Returns the store for `profile`
    ///
    /// # Errors
    /// Returns an error if the profile is unknown or the client cannot be built
    async fn resolve(&self, profile: &ProfileId) -> anyhow::Result<Arc<dyn IObjectStore>>;
}
