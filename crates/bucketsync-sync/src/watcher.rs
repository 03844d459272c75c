//! File watching and debounced change batching
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor a sync
//! root for changes, converting raw OS events into [`ChangeEvent`] values.
//!
//! The [`DebouncedChangeQueue`] collects rapid-fire events and releases them
//! as one batch once the whole queue has been quiet for the debounce window,
//! so a burst of N events turns into a single reconciliation. A maximum
//! delay bounds how long a continuous burst can postpone the batch.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents / kqueue
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  DebouncedChangeQueue  ──→  WatchLoop
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::filesystem::TEMP_SUFFIX;

// ============================================================================
// ChangeEvent
// ============================================================================

/// A filesystem change under a watched root
///
/// Decoupled from the `notify` crate's raw event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { old: PathBuf, new: PathBuf },
}

impl ChangeEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches a directory tree using the OS-native mechanism
///
/// Events are delivered on the receiver returned by [`FileWatcher::new`].
/// Dropping the watcher ends the subscription and closes the channel.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Creates a watcher whose events are buffered in a channel of `buffer` slots
    ///
    /// When the buffer is full further events are dropped: the consumer
    /// already has undelivered changes, so a reconciliation is pending anyway.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new(buffer: usize) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(buffer.max(1));

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        match event_tx.try_send(change) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(change)) => {
                                trace!(path = %change.path().display(), "Event buffer full; dropping event");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                trace!("Event receiver closed");
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((
            Self {
                watcher,
                watched: Vec::new(),
            },
            event_rx,
        ))
    }

    /// Starts watching a directory recursively
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (e.g., does not exist,
    /// insufficient permissions, or inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Starting recursive watch");

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))?;
        self.watched.push(path.to_path_buf());
        Ok(())
    }

    /// Stops watching a directory
    ///
    /// # Errors
    /// Returns an error if the path was not being watched
    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Stopping watch");

        self.watcher
            .unwatch(path)
            .with_context(|| format!("Failed to unwatch path: {}", path.display()))?;
        self.watched.retain(|watched| watched != path);
        Ok(())
    }

    /// Stops watching every directory
    pub fn unwatch_all(&mut self) {
        for path in std::mem::take(&mut self.watched) {
            if let Err(e) = self.watcher.unwatch(&path) {
                debug!(path = %path.display(), error = %e, "Unwatch failed");
            }
        }
    }

    /// Directories currently watched
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into a [`ChangeEvent`]
///
/// - `Create(*)` -> `Created`
/// - `Modify(Name(Both))` with 2 paths -> `Renamed`
/// - `Remove(*)` -> `Deleted`
/// - any other `Modify(*)` -> `Modified`
///
/// Access events, events without paths and events on in-progress download
/// files are ignored.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;
    let path = paths.first()?;
    if is_download_temp(path) {
        return None;
    }

    let change = match &event.kind {
        EventKind::Create(_) => ChangeEvent::Created(path.clone()),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            ChangeEvent::Renamed {
                old: paths[0].clone(),
                new: paths[1].clone(),
            }
        }
        EventKind::Modify(_) => ChangeEvent::Modified(path.clone()),
        EventKind::Remove(_) => ChangeEvent::Deleted(path.clone()),
        _ => {
            trace!(kind = ?event.kind, "Ignoring event kind");
            return None;
        }
    };

    debug!(event = ?change, "Mapped file event");
    Some(change)
}

fn is_download_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMP_SUFFIX))
}

// ============================================================================
// DebouncedChangeQueue
// ============================================================================

/// Queue that releases changes as one batch after a quiet period
///
/// Every push restarts the quiet window. [`poll`](Self::poll) returns the
/// whole pending batch once no event arrived for `debounce`, or once the
/// oldest pending event has waited `max_delay`, whichever comes first.
/// Repeated events for the same path are coalesced, keeping the latest.
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, ChangeEvent>,
    first_event_at: Option<Instant>,
    last_event_at: Option<Instant>,
    debounce: Duration,
    max_delay: Duration,
}

impl DebouncedChangeQueue {
    /// Creates a queue; `max_delay` is raised to `debounce` if smaller
    pub fn new(debounce: Duration, max_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            first_event_at: None,
            last_event_at: None,
            debounce,
            max_delay: max_delay.max(debounce),
        }
    }

    /// Adds an event observed now
    pub fn push(&mut self, event: ChangeEvent) {
        self.push_at(event, Instant::now());
    }

    /// Adds an event observed at `at`
    pub fn push_at(&mut self, event: ChangeEvent, at: Instant) {
        trace!(event = ?event, "Enqueuing change event");
        self.pending.insert(event.path().to_path_buf(), event);
        self.first_event_at.get_or_insert(at);
        self.last_event_at = Some(at);
    }

    /// Releases the pending batch if it has settled by now
    pub fn poll(&mut self) -> Vec<ChangeEvent> {
        self.poll_at(Instant::now())
    }

    /// Releases the pending batch if it has settled by `now`
    pub fn poll_at(&mut self, now: Instant) -> Vec<ChangeEvent> {
        let (Some(first), Some(last)) = (self.first_event_at, self.last_event_at) else {
            return Vec::new();
        };

        let quiet = now.saturating_duration_since(last) >= self.debounce;
        let overdue = now.saturating_duration_since(first) >= self.max_delay;
        if !quiet && !overdue {
            return Vec::new();
        }

        self.first_event_at = None;
        self.last_event_at = None;
        let mut batch: Vec<ChangeEvent> = self.pending.drain().map(|(_, event)| event).collect();
        batch.sort_by(|a, b| a.path().cmp(b.path()));
        debug!(count = batch.len(), quiet, overdue, "Change batch settled");
        batch
    }

    /// Number of distinct paths waiting
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
