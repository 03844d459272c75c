//! Watch session loop
//!
//! A [`WatchLoop`] turns the file events of one watched root into
//! reconciliation batches:
//!
//! - events are pushed into a [`DebouncedChangeQueue`] and polled on a
//!   short interval; a settled batch of changes is one trigger
//! - at most one batch runs at a time; a trigger that arrives while a batch
//!   is running only records that one more batch is needed, which starts as
//!   soon as the current one finishes
//! - a failed batch is reported and the loop keeps watching
//! - on stop no further batch starts, the running one is awaited, and the
//!   loop returns
//!
//! The loop never owns its registry entry. It holds a weak reference to the
//! session table and looks itself up by id to record `last_sync`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bucketsync_core::config::Config;
use bucketsync_core::domain::{
    BatchId, BatchReport, ErrorEvent, EventOrigin, PlanOptions, SessionId, SyncDirection,
    SyncEvent, SyncTarget,
};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::SyncEngine;
use crate::registry::SessionEntry;
use crate::watcher::{ChangeEvent, DebouncedChangeQueue};
use crate::SyncError;

/// Tunables of one watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period that settles a burst of file events
    pub debounce: Duration,
    /// How often the debounce queue is checked
    pub poll_interval: Duration,
    /// Upper bound on how long a continuous burst can delay a batch
    pub max_delay: Duration,
    /// Run one batch right after the session starts watching
    pub initial_sync: bool,
    /// File events buffered between the OS watcher and the loop
    pub event_buffer: usize,
    /// Delete remote objects that no longer exist locally
    pub delete_orphans: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            poll_interval: Duration::from_millis(50),
            max_delay: Duration::from_millis(5000),
            initial_sync: true,
            event_buffer: 1024,
            delete_orphans: false,
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.watch.debounce_ms),
            poll_interval: Duration::from_millis(config.watch.poll_interval_ms.max(1)),
            max_delay: Duration::from_millis(config.watch.max_delay_ms),
            initial_sync: config.watch.initial_sync,
            event_buffer: config.watch.event_buffer,
            delete_orphans: config.sync.delete_orphans,
        }
    }

    #[must_use]
    pub fn with_initial_sync(mut self, initial_sync: bool) -> Self {
        self.initial_sync = initial_sync;
        self
    }

    fn plan_options(&self) -> PlanOptions {
        PlanOptions::new(SyncDirection::LocalToRemote).with_delete_orphans(self.delete_orphans)
    }
}

type BatchOutcome = Result<BatchReport, SyncError>;
type InFlight = Option<(BatchId, JoinHandle<BatchOutcome>)>;

/// Event loop of one watch session
pub(crate) struct WatchLoop {
    session_id: SessionId,
    target: SyncTarget,
    engine: Arc<SyncEngine>,
    changes: mpsc::Receiver<ChangeEvent>,
    queue: DebouncedChangeQueue,
    stop: CancellationToken,
    table: Weak<Mutex<HashMap<SessionId, SessionEntry>>>,
    options: WatchOptions,
}

impl WatchLoop {
    pub(crate) fn new(
        session_id: SessionId,
        target: SyncTarget,
        engine: Arc<SyncEngine>,
        changes: mpsc::Receiver<ChangeEvent>,
        stop: CancellationToken,
        table: Weak<Mutex<HashMap<SessionId, SessionEntry>>>,
        options: WatchOptions,
    ) -> Self {
        Self {
            session_id,
            target,
            engine,
            changes,
            queue: DebouncedChangeQueue::new(options.debounce, options.max_delay),
            stop,
            table,
            options,
        }
    }

    #[instrument(skip(self), fields(session = %self.session_id, root = %self.target.local_root))]
    pub(crate) async fn run(mut self) {
        info!("Watch loop started");

        let mut poll = tokio::time::interval(self.options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: InFlight = None;
        let mut rerun_requested = false;
        let mut changes_open = true;

        if self.options.initial_sync {
            in_flight = Some(self.spawn_batch());
        }

        loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => break,

                (batch_id, joined) = wait_in_flight(&mut in_flight) => {
                    in_flight = None;
                    self.finish_batch(batch_id, joined).await;
                    if rerun_requested {
                        debug!("Starting the batch requested while the previous one ran");
                        rerun_requested = false;
                        in_flight = Some(self.spawn_batch());
                    }
                }

                change = self.changes.recv(), if changes_open => match change {
                    Some(change) => self.queue.push(change),
                    None => {
                        // The watcher is gone; only a stop request can follow
                        debug!("File event channel closed");
                        changes_open = false;
                    }
                },

                _ = poll.tick() => {
                    let settled = self.queue.poll();
                    if settled.is_empty() {
                        continue;
                    }
                    if in_flight.is_some() {
                        debug!(changes = settled.len(), "Batch running; one more requested");
                        rerun_requested = true;
                    } else {
                        info!(changes = settled.len(), "Changes settled; starting batch");
                        in_flight = Some(self.spawn_batch());
                    }
                }
            }
        }

        if let Some((batch_id, handle)) = in_flight.take() {
            debug!(batch = %batch_id, "Waiting for the running batch before stopping");
            let joined = handle.await;
            self.finish_batch(batch_id, joined).await;
        }

        info!("Watch loop stopped");
    }

    fn spawn_batch(&self) -> (BatchId, JoinHandle<BatchOutcome>) {
        let batch_id = BatchId::new();
        let origin = EventOrigin::session(batch_id, self.session_id);
        let engine = Arc::clone(&self.engine);
        let target = self.target.clone();
        let options = self.options.plan_options();

        // Stopping the session never cancels a batch that already started
        let handle = tokio::spawn(async move {
            engine
                .run_batch(&target, options, origin, &CancellationToken::new())
                .await
        });
        (batch_id, handle)
    }

    async fn finish_batch(&self, batch_id: BatchId, joined: Result<BatchOutcome, JoinError>) {
        match joined {
            Ok(Ok(report)) => {
                if report.is_success() {
                    self.record_last_sync().await;
                } else {
                    warn!(
                        batch = %batch_id,
                        failed = report.failures.len(),
                        "Batch finished with failures; still watching"
                    );
                }
            }
            Ok(Err(e)) => {
                // run_batch already emitted the terminal Error event
                warn!(batch = %batch_id, error = %e, "Batch aborted; still watching");
            }
            Err(e) => {
                error!(batch = %batch_id, error = %e, "Batch task aborted; still watching");
                self.engine.events().emit(SyncEvent::Error(ErrorEvent {
                    origin: EventOrigin::session(batch_id, self.session_id),
                    message: format!(
                        "reconciliation of session {} aborted: {e}",
                        self.session_id
                    ),
                }));
            }
        }
    }

    async fn record_last_sync(&self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut sessions = table.lock().await;
        if let Some(entry) = sessions.get_mut(&self.session_id) {
            entry.summary.last_sync = Some(Utc::now());
        }
    }
}

async fn wait_in_flight(in_flight: &mut InFlight) -> (BatchId, Result<BatchOutcome, JoinError>) {
    match in_flight {
        Some((batch_id, handle)) => (*batch_id, handle.await),
        None => std::future::pending().await,
    }
}
