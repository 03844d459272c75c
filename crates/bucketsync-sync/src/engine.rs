//! Folder to bucket synchronization engine
//!
//! The [`SyncEngine`] runs one reconciliation batch between a local
//! directory and a bucket prefix.
//!
//! ## Batch Flow
//!
//! 1. **Resolve**: look up the object store for the target's profile
//! 2. **Enumerate**: snapshot the local tree and the remote prefix
//! 3. **Plan**: diff the snapshots into transfers, skips and deletions
//! 4. **Execute**: run the plan under the concurrency cap
//!
//! Any failure in steps 1-2 aborts the batch before a single operation runs
//! and is reported as an [`SyncEvent::Error`]. Once execution starts the
//! batch always ends with [`SyncEvent::Completed`], per-operation failures
//! included. Either way exactly one terminal event is emitted per batch.

use std::sync::Arc;
use std::time::Instant;

use bucketsync_core::config::Config;
use bucketsync_core::domain::{
    BatchId, BatchReport, CompletedEvent, ErrorEvent, EventOrigin, PlanOptions, SyncDirection,
    SyncEvent, SyncTarget,
};
use bucketsync_core::ports::{ILocalFileSystem, IObjectStore, IStoreResolver};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::enumerator::{TreeEnumerator, DEFAULT_REMOTE_HASH_THRESHOLD};
use crate::events::{EventBus, DEFAULT_EVENT_CAPACITY};
use crate::executor::{TaskExecutor, DEFAULT_CONCURRENCY};
use crate::planner::{plan, SyncPlan};
use crate::SyncError;

/// Tunables shared by every batch of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of operations running at once
    pub concurrency: usize,
    /// Remote objects without a reusable ETag up to this size are downloaded to be hashed
    pub remote_hash_threshold: u64,
    /// Events buffered per subscriber
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            remote_hash_threshold: DEFAULT_REMOTE_HASH_THRESHOLD,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.sync.concurrency,
            remote_hash_threshold: config.remote_hash_threshold_bytes(),
            event_capacity: config.watch.event_buffer,
        }
    }
}

/// Everything a batch needs once enumeration succeeded
struct PreparedBatch {
    store: Arc<dyn IObjectStore>,
    plan: SyncPlan,
    warnings: Vec<String>,
}

/// Runs reconciliation batches and publishes their events
pub struct SyncEngine {
    resolver: Arc<dyn IStoreResolver>,
    fs: Arc<dyn ILocalFileSystem>,
    events: EventBus,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(
        resolver: Arc<dyn IStoreResolver>,
        fs: Arc<dyn ILocalFileSystem>,
        options: EngineOptions,
    ) -> Self {
        Self {
            resolver,
            fs,
            events: EventBus::new(options.event_capacity),
            options,
        }
    }

    pub fn from_config(
        resolver: Arc<dyn IStoreResolver>,
        fs: Arc<dyn ILocalFileSystem>,
        config: &Config,
    ) -> Self {
        Self::new(resolver, fs, EngineOptions::from_config(config))
    }

    /// Subscribe to progress, terminal and session events
    ///
    /// Slow subscribers lag instead of stalling batches; see [`EventBus`]
    /// for which events survive a lag.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn filesystem(&self) -> &Arc<dyn ILocalFileSystem> {
        &self.fs
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Run one batch in `direction` without deleting orphans
    ///
    /// # Errors
    /// Returns the enumeration error if the batch was aborted before
    /// executing; per-operation failures are part of the report instead
    pub async fn sync_once(
        &self,
        target: &SyncTarget,
        direction: SyncDirection,
    ) -> Result<BatchReport, SyncError> {
        self.sync_once_with(target, PlanOptions::new(direction))
            .await
    }

    /// Run one batch with explicit planning options
    ///
    /// # Errors
    /// See [`sync_once`](Self::sync_once)
    pub async fn sync_once_with(
        &self,
        target: &SyncTarget,
        options: PlanOptions,
    ) -> Result<BatchReport, SyncError> {
        self.sync_once_cancellable(target, options, &CancellationToken::new())
            .await
    }

    /// Run one batch that stops dispatching new operations when `cancel` fires
    ///
    /// # Errors
    /// See [`sync_once`](Self::sync_once)
    pub async fn sync_once_cancellable(
        &self,
        target: &SyncTarget,
        options: PlanOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, SyncError> {
        let origin = EventOrigin::batch(BatchId::new());
        self.run_batch(target, options, origin, cancel).await
    }

    /// Run one batch attributed to `origin`
    #[instrument(skip(self, target, cancel), fields(local = %target.local_root, remote = %target.remote_display()))]
    pub(crate) async fn run_batch(
        &self,
        target: &SyncTarget,
        options: PlanOptions,
        origin: EventOrigin,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, SyncError> {
        let started = Instant::now();
        info!(origin = %origin, direction = %options.direction, "Starting batch");

        let prepared = match self.prepare(target, options).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(origin = %origin, error = %e, "Batch aborted before executing");
                self.events.emit(SyncEvent::Error(ErrorEvent {
                    origin,
                    message: e.to_string(),
                }));
                return Err(e);
            }
        };

        let executor = TaskExecutor::new(
            prepared.store,
            Arc::clone(&self.fs),
            self.options.concurrency,
        );
        let outcome = executor
            .execute(target, &prepared.plan, origin, &self.events, cancel)
            .await;

        self.events.emit(SyncEvent::Completed(CompletedEvent {
            origin,
            result: outcome.result,
            failures: outcome.failures.clone(),
            finished_at: Utc::now(),
        }));

        let report = BatchReport {
            batch_id: origin.batch_id,
            result: outcome.result,
            failures: outcome.failures,
            conflicts: prepared.plan.conflicts().to_vec(),
            warnings: prepared.warnings,
            not_dispatched: outcome.not_dispatched,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            origin = %origin,
            changed = report.result.changed(),
            failed = report.failures.len(),
            duration_ms = report.duration_ms,
            "Batch finished"
        );
        Ok(report)
    }

    async fn prepare(
        &self,
        target: &SyncTarget,
        options: PlanOptions,
    ) -> Result<PreparedBatch, SyncError> {
        let store = self
            .resolver
            .resolve(&target.profile)
            .await
            .map_err(|e| SyncError::Store {
                profile: target.profile.clone(),
                message: format!("{e:#}"),
            })?;

        let enumerator = TreeEnumerator::new(Arc::clone(&self.fs), self.options.remote_hash_threshold);
        let (local, remote) = tokio::try_join!(
            enumerator.enumerate_local(&target.local_root),
            enumerator.enumerate_remote(store.as_ref(), &target.bucket, &target.prefix),
        )?;

        let plan = plan(&local.mapping, &remote.mapping, options);
        let mut warnings = local.warnings;
        warnings.extend(remote.warnings);

        Ok(PreparedBatch {
            store,
            plan,
            warnings,
        })
    }
}
