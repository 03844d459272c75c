//! Session registry
//!
//! Process-wide table of watch sessions. The registry owns each session's
//! file watcher, stop token and loop task; a session is listed from the
//! moment its subscription is established until `stop_watch` removes it.

use std::collections::HashMap;
use std::sync::Arc;

use bucketsync_core::domain::{SessionId, SessionState, SessionSummary, SyncEvent, SyncTarget};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::engine::SyncEngine;
use crate::session::{WatchLoop, WatchOptions};
use crate::watcher::FileWatcher;
use crate::{RegistryError, SyncError};

/// Registry-side state of one session
pub(crate) struct SessionEntry {
    pub(crate) summary: SessionSummary,
    stop: CancellationToken,
    watcher: Option<FileWatcher>,
    handle: Option<JoinHandle<()>>,
}

type SessionTable = Arc<Mutex<HashMap<SessionId, SessionEntry>>>;

/// Starts, stops and lists watch sessions sharing one engine
pub struct SessionRegistry {
    engine: Arc<SyncEngine>,
    sessions: SessionTable,
    options: WatchOptions,
}

impl SessionRegistry {
    pub fn new(engine: Arc<SyncEngine>, options: WatchOptions) -> Self {
        Self {
            engine,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            options,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Start watching `target` with the registry's default options
    ///
    /// # Errors
    /// See [`start_watch_with`](Self::start_watch_with)
    pub async fn start_watch(&self, target: SyncTarget) -> Result<SessionId, SyncError> {
        self.start_watch_with(target, self.options).await
    }

    /// Start watching `target` and return the new session's id
    ///
    /// The local root is created when missing. The session is listed as
    /// `Watching` as soon as this returns.
    ///
    /// # Errors
    /// - `RegistryError::AlreadyWatching` if another session watches the same root
    /// - `SyncError::Io` if the root cannot be created or is not a directory
    /// - `SyncError::Subscription` if the OS watcher cannot be set up
    #[instrument(skip(self, target, options), fields(root = %target.local_root))]
    pub async fn start_watch_with(
        &self,
        target: SyncTarget,
        options: WatchOptions,
    ) -> Result<SessionId, SyncError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions
            .values()
            .find(|entry| entry.summary.target.local_root == target.local_root)
        {
            return Err(RegistryError::AlreadyWatching {
                path: target.local_root.as_path().to_path_buf(),
                existing: existing.summary.id,
            }
            .into());
        }

        self.ensure_root(&target).await?;

        let subscription_error = |e: anyhow::Error| SyncError::Subscription {
            path: target.local_root.as_path().to_path_buf(),
            message: format!("{e:#}"),
        };
        let (mut watcher, changes) =
            FileWatcher::new(options.event_buffer).map_err(subscription_error)?;
        watcher
            .watch(target.local_root.as_path())
            .map_err(subscription_error)?;

        let session_id = SessionId::new();
        let summary = SessionSummary {
            id: session_id,
            target: target.clone(),
            state: SessionState::Created.transition_to(SessionState::Watching)?,
            started_at: Utc::now(),
            last_sync: None,
        };

        // Announce before the loop can emit anything for its first batch
        self.engine.events().emit(SyncEvent::SessionStarted {
            session_id,
            target: target.clone(),
        });

        let stop = CancellationToken::new();
        let watch_loop = WatchLoop::new(
            session_id,
            target,
            Arc::clone(&self.engine),
            changes,
            stop.clone(),
            Arc::downgrade(&self.sessions),
            options,
        );
        let handle = tokio::spawn(watch_loop.run());

        sessions.insert(
            session_id,
            SessionEntry {
                summary,
                stop,
                watcher: Some(watcher),
                handle: Some(handle),
            },
        );

        info!(session = %session_id, "Watch session started");
        Ok(session_id)
    }

    /// Stop a session and wait for its running batch to finish
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` if no `Watching` session has this id,
    /// including a session another caller is already stopping
    #[instrument(skip(self))]
    pub async fn stop_watch(&self, session_id: SessionId) -> Result<(), SyncError> {
        let (watcher, handle) = {
            let mut sessions = self.sessions.lock().await;
            let entry = sessions
                .get_mut(&session_id)
                .filter(|entry| entry.summary.state == SessionState::Watching)
                .ok_or(RegistryError::NotFound(session_id))?;

            entry.summary.state = entry.summary.state.transition_to(SessionState::Stopping)?;
            entry.stop.cancel();
            (entry.watcher.take(), entry.handle.take())
        };

        // Unsubscribe first; the loop stops pulling events once cancelled
        drop(watcher);

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(session = %session_id, error = %e, "Watch loop task aborted");
            }
        }

        let removed = self.sessions.lock().await.remove(&session_id);
        if let Some(mut entry) = removed {
            entry.summary.state = entry.summary.state.transition_to(SessionState::Stopped)?;
        }

        self.engine
            .events()
            .emit(SyncEvent::SessionStopped { session_id });
        info!(session = %session_id, "Watch session stopped");
        Ok(())
    }

    /// Snapshot of every session that is currently watching, oldest first
    pub async fn list_active_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<SessionSummary> = sessions
            .values()
            .filter(|entry| entry.summary.is_active())
            .map(|entry| entry.summary.clone())
            .collect();
        active.sort_by_key(|summary| summary.started_at);
        active
    }

    pub async fn get(&self, session_id: SessionId) -> Option<SessionSummary> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|entry| entry.summary.clone())
    }

    /// Stop every active session
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self
            .list_active_sessions()
            .await
            .into_iter()
            .map(|summary| summary.id)
            .collect();

        for session_id in ids {
            if let Err(e) = self.stop_watch(session_id).await {
                warn!(session = %session_id, error = %e, "Failed to stop session during shutdown");
            }
        }
    }

    async fn ensure_root(&self, target: &SyncTarget) -> Result<(), SyncError> {
        let root = &target.local_root;
        let io_error = |message: String| SyncError::Io {
            path: root.as_path().to_path_buf(),
            message,
        };

        let fs = self.engine.filesystem();
        let state = fs
            .get_state(root)
            .await
            .map_err(|e| io_error(format!("{e:#}")))?;

        if !state.exists {
            info!(root = %root, "Creating missing local directory");
            fs.create_directory(root)
                .await
                .map_err(|e| io_error(format!("{e:#}")))?;
        } else if !state.is_directory() {
            return Err(io_error("not a directory".to_string()));
        }
        Ok(())
    }
}
