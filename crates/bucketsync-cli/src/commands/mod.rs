//! CLI subcommands and the wiring they share

pub mod config;
pub mod sync;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bucketsync_core::config::Config;
use bucketsync_core::domain::{
    ProfileId, RemotePrefix, SyncEvent, SyncPath, SyncTarget, TaskState,
};
use bucketsync_s3::resolver::{S3StoreResolver, DEFAULT_PROFILE};
use bucketsync_sync::engine::{EngineOptions, SyncEngine};
use bucketsync_sync::filesystem::LocalFileSystemAdapter;

use crate::output::OutputFormat;

/// Global options every command receives
pub struct Context {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
    pub config: Config,
}

/// Which folder syncs with which bucket prefix
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Storage profile from the config file
    #[arg(long, default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Bucket name
    #[arg(long)]
    pub bucket: String,

    /// Key prefix inside the bucket (empty for the whole bucket)
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Local directory
    #[arg(long)]
    pub local: PathBuf,
}

impl TargetArgs {
    pub fn to_target(&self) -> Result<SyncTarget> {
        let local = if self.local.is_absolute() {
            self.local.clone()
        } else {
            std::env::current_dir()
                .context("Failed to resolve the current directory")?
                .join(&self.local)
        };

        let target = SyncTarget::new(
            ProfileId::new(self.profile.as_str())?,
            self.bucket.as_str(),
            RemotePrefix::new(self.prefix.as_str())?,
            SyncPath::new(local)?,
        )?;
        Ok(target)
    }
}

/// S3-backed engine configured from the config file
pub fn build_engine(config: &Config, options: EngineOptions) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        Arc::new(S3StoreResolver::from_config(config)),
        Arc::new(LocalFileSystemAdapter::new()),
        options,
    ))
}

/// Cancels `token` on SIGINT or SIGTERM
pub fn spawn_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

/// One-line description of an event, or `None` for events not worth a line
pub fn describe_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::SessionStarted { session_id, target } => Some(format!(
            "Session {session_id} watching {} -> {}",
            target.local_root,
            target.remote_display()
        )),
        SyncEvent::SessionStopped { session_id } => Some(format!("Session {session_id} stopped")),
        SyncEvent::Progress(progress) => match &progress.task_state {
            TaskState::Completed => Some(format!(
                "[{}/{}] {} {}",
                progress.current_index, progress.total, progress.operation, progress.current_path
            )),
            TaskState::Failed(reason) => Some(format!(
                "[{}/{}] {} {} failed: {reason}",
                progress.current_index, progress.total, progress.operation, progress.current_path
            )),
            TaskState::Pending | TaskState::Running => None,
        },
        SyncEvent::Completed(completed) => Some(format!(
            "Batch {} done: {} uploaded, {} downloaded, {} deleted, {} unchanged, {} failed",
            completed.origin.batch_id,
            completed.result.uploaded,
            completed.result.downloaded,
            completed.result.deleted,
            completed.result.skipped,
            completed.failures.len()
        )),
        SyncEvent::Error(error) => Some(format!("{}: {}", error.origin, error.message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_core::domain::{
        BatchId, CompletedEvent, EventOrigin, OperationKind, ProgressEvent, RelativePath,
        SyncResult,
    };

    fn args(local: &str, prefix: &str) -> TargetArgs {
        TargetArgs {
            profile: "default".to_string(),
            bucket: "photos".to_string(),
            prefix: prefix.to_string(),
            local: PathBuf::from(local),
        }
    }

    #[test]
    fn test_relative_local_path_is_made_absolute() {
        let target = args("some/dir", "").to_target().unwrap();
        assert!(target.local_root.as_path().is_absolute());
        assert!(target.local_root.as_path().ends_with("some/dir"));
    }

    #[test]
    fn test_target_keeps_bucket_and_prefix() {
        let target = args("/data/photos", "2024/").to_target().unwrap();
        assert_eq!(target.bucket, "photos");
        assert_eq!(target.prefix.as_str(), "2024/");
        assert_eq!(target.profile.as_str(), "default");
    }

    #[test]
    fn test_running_progress_is_not_printed() {
        let mut progress = ProgressEvent {
            origin: EventOrigin::batch(BatchId::new()),
            current_index: 0,
            total: 2,
            current_path: RelativePath::new("a.txt").unwrap(),
            operation: OperationKind::Upload,
            task_state: TaskState::Running,
        };
        assert!(describe_event(&SyncEvent::Progress(progress.clone())).is_none());

        progress.current_index = 1;
        progress.task_state = TaskState::Completed;
        let line = describe_event(&SyncEvent::Progress(progress)).unwrap();
        assert!(line.starts_with("[1/2]"));
        assert!(line.ends_with("a.txt"));
    }

    #[test]
    fn test_completed_line_has_counts() {
        let event = SyncEvent::Completed(CompletedEvent {
            origin: EventOrigin::batch(BatchId::new()),
            result: SyncResult {
                uploaded: 3,
                downloaded: 0,
                deleted: 1,
                skipped: 5,
            },
            failures: Vec::new(),
            finished_at: chrono::Utc::now(),
        });
        let line = describe_event(&event).unwrap();
        assert!(line.contains("3 uploaded"));
        assert!(line.contains("1 deleted"));
        assert!(line.contains("5 unchanged"));
    }
}
