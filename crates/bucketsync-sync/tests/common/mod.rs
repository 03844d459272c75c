//! Shared fixtures for the bucketsync-sync integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bucketsync_core::domain::{ProfileId, RemotePrefix, SyncEvent, SyncPath, SyncTarget};
use bucketsync_core::ports::{IObjectStore, ObjectPage};
use bucketsync_sync::engine::{EngineOptions, SyncEngine};
use bucketsync_sync::filesystem::LocalFileSystemAdapter;
use bucketsync_sync::memory::{FixedStoreResolver, InMemoryObjectStore};
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const BUCKET: &str = "bucket";

pub fn target(root: &Path, prefix: &str) -> SyncTarget {
    SyncTarget::new(
        ProfileId::new("test").unwrap(),
        BUCKET,
        RemotePrefix::new(prefix).unwrap(),
        SyncPath::new(root.to_path_buf()).unwrap(),
    )
    .unwrap()
}

pub fn engine(store: Arc<dyn IObjectStore>, concurrency: usize) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        Arc::new(FixedStoreResolver::new(store)),
        Arc::new(LocalFileSystemAdapter::new()),
        EngineOptions {
            concurrency,
            ..EngineOptions::default()
        },
    ))
}

/// A temp directory plus an in-memory bucket
pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<InMemoryObjectStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            store: Arc::new(InMemoryObjectStore::new()),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn target(&self) -> SyncTarget {
        target(self.dir.path(), "")
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        engine(self.store.clone(), 20)
    }

    pub fn write_local(&self, relative: &str, contents: &str) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn read_local(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join(relative)).ok()
    }

    pub fn remote(&self, key: &str) -> Option<String> {
        self.store
            .get(BUCKET, key)
            .map(|data| String::from_utf8(data).unwrap())
    }
}

/// What a [`RecordingStore`] observed, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    PutStarted(String),
    PutFinished(String),
    DeleteStarted(String),
    DeleteFinished(String),
}

/// Store wrapper that logs calls, delays writes and fails keys containing "fail"
pub struct RecordingStore {
    pub inner: InMemoryObjectStore,
    pub calls: Mutex<Vec<StoreCall>>,
    pub put_delay: Duration,
}

impl RecordingStore {
    pub fn new(put_delay: Duration) -> Self {
        Self {
            inner: InMemoryObjectStore::new(),
            calls: Mutex::new(Vec::new()),
            put_delay,
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl IObjectStore for RecordingStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> anyhow::Result<ObjectPage> {
        self.inner.list_objects(bucket, prefix, continuation).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        self.inner.get_object(bucket, key).await
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.record(StoreCall::PutStarted(key.to_string()));
        tokio::time::sleep(self.put_delay).await;
        let result = if key.contains("fail") {
            Err(anyhow::anyhow!("simulated outage for {key}"))
        } else {
            self.inner.put_object(bucket, key, data).await
        };
        self.record(StoreCall::PutFinished(key.to_string()));
        result
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        self.record(StoreCall::DeleteStarted(key.to_string()));
        let result = self.inner.delete_object(bucket, key).await;
        self.record(StoreCall::DeleteFinished(key.to_string()));
        result
    }
}

/// Drain every event currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
