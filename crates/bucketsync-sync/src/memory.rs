//! In-memory object store
//!
//! [`InMemoryObjectStore`] implements [`IObjectStore`] over a sorted map so
//! the engine can run end to end without a network. It mimics the S3
//! behaviours the engine depends on: lexicographically ordered listings,
//! paging with continuation tokens, and single-part ETags that are the
//! quoted MD5 of the content.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bucketsync_core::domain::ProfileId;
use bucketsync_core::ports::{IObjectStore, IStoreResolver, ObjectInfo, ObjectPage};
use chrono::{DateTime, Utc};

use crate::fingerprint::fingerprint_bytes;

/// Listing page size used by S3 when `max-keys` is not set
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type ObjectKey = (String, String);

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
    etag: Option<String>,
}

/// Object store held entirely in memory
#[derive(Debug)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectKey, StoredObject>>,
    page_size: usize,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit listing pages to `page_size` keys
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store an object with the current time as last-modified
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.insert_with_modified(bucket, key, data, Utc::now());
    }

    /// Store an object with an explicit last-modified time
    pub fn insert_with_modified(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
    ) {
        let data = data.into();
        let etag = Some(single_part_etag(&data));
        self.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                last_modified,
                etag,
            },
        );
    }

    /// Store an object with a provider-specific ETag, e.g. a multipart
    /// `"<hex>-<parts>"` tag or `None` for stores that report no ETag
    pub fn insert_with_etag(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
        etag: Option<String>,
    ) {
        self.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                last_modified,
                etag,
            },
        );
    }

    /// Contents of an object, if present
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.data.clone())
    }

    /// Last-modified time of an object, if present
    pub fn modified(&self, bucket: &str, key: &str) -> Option<DateTime<Utc>> {
        self.read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.last_modified)
    }

    /// All keys of a bucket in listing order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ObjectKey, StoredObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ObjectKey, StoredObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn single_part_etag(data: &[u8]) -> String {
    format!("\"{}\"", fingerprint_bytes(data))
}

#[async_trait::async_trait]
impl IObjectStore for InMemoryObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> anyhow::Result<ObjectPage> {
        let objects = self.read();
        let start = match continuation {
            // The token is the last key of the previous page
            Some(after) => Bound::Excluded((bucket.to_string(), after.to_string())),
            None => Bound::Included((bucket.to_string(), prefix.to_string())),
        };

        let mut page = Vec::new();
        let mut more = false;
        for ((b, key), object) in objects.range((start, Bound::Unbounded)) {
            if b != bucket || !key.starts_with(prefix) {
                break;
            }
            if page.len() == self.page_size {
                more = true;
                break;
            }
            page.push(ObjectInfo {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
                etag: object.etag.clone(),
            });
        }

        let next_continuation = if more {
            page.last().map(|info| info.key.clone())
        } else {
            None
        };
        Ok(ObjectPage {
            objects: page,
            next_continuation,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        self.get(bucket, key)
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {bucket}/{key}"))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.insert(bucket, key, data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        // S3 treats deleting a missing key as success
        self.write().remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Resolves every profile to the same store
#[derive(Clone)]
pub struct FixedStoreResolver {
    store: Arc<dyn IObjectStore>,
}

impl FixedStoreResolver {
    pub fn new(store: Arc<dyn IObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl IStoreResolver for FixedStoreResolver {
    async fn resolve(&self, _profile: &ProfileId) -> anyhow::Result<Arc<dyn IObjectStore>> {
        Ok(Arc::clone(&self.store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryObjectStore::new();
        store.put_object("b", "a.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get_object("b", "a.txt").await.unwrap(), b"hello");

        store.delete_object("b", "a.txt").await.unwrap();
        assert!(store.get_object("b", "a.txt").await.is_err());
        // Deleting again is not an error
        store.delete_object("b", "a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_listing_is_scoped_to_bucket_and_prefix() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "p/a.txt", "a");
        store.insert("b", "p/sub/b.txt", "b");
        store.insert("b", "q/c.txt", "c");
        store.insert("other", "p/d.txt", "d");

        let page = store.list_objects("b", "p/", None).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["p/a.txt", "p/sub/b.txt"]);
        assert!(page.next_continuation.is_none());
    }

    #[tokio::test]
    async fn test_listing_pages_with_continuation() {
        let store = InMemoryObjectStore::new().with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            store.insert("b", &format!("{name}.txt"), name);
        }

        let mut continuation: Option<String> = None;
        let mut keys = Vec::new();
        let mut pages = 0;
        loop {
            let page = store
                .list_objects("b", "", continuation.as_deref())
                .await
                .unwrap();
            pages += 1;
            keys.extend(page.objects.into_iter().map(|o| o.key));
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);
    }

    #[tokio::test]
    async fn test_etag_is_quoted_md5() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "a.txt", "hello world");
        let page = store.list_objects("b", "", None).await.unwrap();
        assert_eq!(
            page.objects[0].etag.as_deref(),
            Some("\"5eb63bbbe01eeed093cb22bb8f5acdc3\"")
        );
    }

    #[tokio::test]
    async fn test_fixed_resolver_returns_shared_store() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.insert("b", "a.txt", "x");
        let resolver = FixedStoreResolver::new(store.clone());

        let resolved = resolver
            .resolve(&ProfileId::new("any").unwrap())
            .await
            .unwrap();
        assert_eq!(resolved.get_object("b", "a.txt").await.unwrap(), b"x");
    }
}
