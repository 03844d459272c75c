//! Sync target: what a batch or watch session reconciles

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ProfileId, RemotePrefix, SyncPath};

/// The (profile, bucket, prefix, local root) tuple a sync is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTarget {
    pub profile: ProfileId,
    pub bucket: String,
    pub prefix: RemotePrefix,
    pub local_root: SyncPath,
}

impl SyncTarget {
    /// Creates a target
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if the bucket name is empty
    pub fn new(
        profile: ProfileId,
        bucket: impl Into<String>,
        prefix: RemotePrefix,
        local_root: SyncPath,
    ) -> Result<Self, DomainError> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "bucket name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            profile,
            bucket,
            prefix,
            local_root,
        })
    }

    /// `bucket/prefix` rendering used in logs and messages
    pub fn remote_display(&self) -> String {
        format!("{}/{}", self.bucket, self.prefix)
    }
}
