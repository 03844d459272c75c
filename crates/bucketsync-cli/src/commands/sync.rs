//! Sync command - Reconcile a folder and a bucket prefix once
//!
//! Provides the `bucketsync sync` CLI command which:
//! 1. Resolves the target and the storage profile from the config file
//! 2. Runs one batch, streaming per-file progress while it executes
//! 3. Prints the batch report and exits non-zero if any operation failed

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bucketsync_core::domain::{BatchReport, PlanOptions, SyncDirection, SyncEvent};
use bucketsync_sync::engine::EngineOptions;

use super::{build_engine, describe_event, spawn_shutdown_signal, Context, TargetArgs};
use crate::output::{duration, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// local_to_remote, remote_to_local or bidirectional (default from config)
    #[arg(long)]
    pub direction: Option<SyncDirection>,

    /// Delete destination entries missing on the source side
    #[arg(long)]
    pub delete_orphans: bool,

    /// Maximum number of transfers running at once
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let target = self.target.to_target()?;

        let direction = self.direction.unwrap_or(ctx.config.sync.direction);
        let options = PlanOptions::new(direction)
            .with_delete_orphans(self.delete_orphans || ctx.config.sync.delete_orphans);

        let mut engine_options = EngineOptions::from_config(&ctx.config);
        if let Some(concurrency) = self.concurrency {
            engine_options.concurrency = concurrency.max(1);
        }
        let engine = build_engine(&ctx.config, engine_options);

        // Ctrl+C stops dispatching; running transfers still finish
        let cancel = CancellationToken::new();
        spawn_shutdown_signal(cancel.clone());

        let printer = (!ctx.quiet).then(|| spawn_progress_printer(engine.subscribe(), ctx.format));

        info!(
            local = %target.local_root,
            remote = %target.remote_display(),
            direction = %direction,
            "Starting sync"
        );
        let result = engine
            .sync_once_cancellable(&target, options, &cancel)
            .await;

        if let Some(printer) = printer {
            // The printer exits after the batch's terminal event
            let _ = printer.await;
        }

        let report = result.with_context(|| {
            format!(
                "Sync of {} with {} failed",
                target.local_root,
                target.remote_display()
            )
        })?;

        print_report(formatter.as_ref(), ctx.format, &report)?;

        if report.not_dispatched > 0 {
            bail!(
                "interrupted: {} not started",
                plural(report.not_dispatched as u64, "operation")
            );
        }
        if !report.failures.is_empty() {
            bail!(
                "{} failed",
                plural(report.failures.len() as u64, "operation")
            );
        }
        Ok(())
    }
}

/// Print per-file progress until the batch's terminal event
fn spawn_progress_printer(
    mut events: broadcast::Receiver<SyncEvent>,
    format: OutputFormat,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let formatter = get_formatter(format);
        loop {
            match events.recv().await {
                Ok(event) if event.is_terminal() => break,
                Ok(event @ SyncEvent::Progress(_)) => match format {
                    OutputFormat::Json => {
                        if let Ok(value) = serde_json::to_value(&event) {
                            formatter.print_json(&value);
                        }
                    }
                    OutputFormat::Human => {
                        if let Some(line) = describe_event(&event) {
                            formatter.info(&line);
                        }
                    }
                },
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    formatter.warn(&format!("{skipped} progress updates skipped"));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_report(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    report: &BatchReport,
) -> Result<()> {
    if format == OutputFormat::Json {
        let json = serde_json::to_value(report).context("Failed to serialize the report")?;
        formatter.print_json(&json);
        return Ok(());
    }

    let result = &report.result;
    if result.changed() == 0 && report.failures.is_empty() {
        formatter.success(&format!(
            "Already up to date ({} unchanged)",
            plural(result.skipped, "file")
        ));
    } else {
        formatter.success(&format!("Sync completed in {}", duration(report.duration_ms)));
    }

    if result.uploaded > 0 {
        formatter.info(&format!("Uploaded:   {}", plural(result.uploaded, "file")));
    }
    if result.downloaded > 0 {
        formatter.info(&format!("Downloaded: {}", plural(result.downloaded, "file")));
    }
    if result.deleted > 0 {
        formatter.info(&format!("Deleted:    {}", plural(result.deleted, "file")));
    }
    if result.skipped > 0 && result.changed() > 0 {
        formatter.info(&format!("Unchanged:  {}", plural(result.skipped, "file")));
    }

    for conflict in &report.conflicts {
        formatter.warn(&format!(
            "{conflict} changed on both sides at the same time; left untouched"
        ));
    }
    for warning in &report.warnings {
        formatter.warn(warning);
    }
    if !report.failures.is_empty() {
        formatter.error(&format!(
            "{} occurred:",
            plural(report.failures.len() as u64, "error")
        ));
        for failure in &report.failures {
            formatter.info(&format!("  - {failure}"));
        }
    }
    Ok(())
}
