//! Watch command - Upload changes of a folder as they settle
//!
//! Starts one watch session, prints its events until SIGINT/SIGTERM, then
//! stops the session after its running batch finishes.

use anyhow::{Context as _, Result};
use clap::Args;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bucketsync_core::domain::SyncEvent;
use bucketsync_sync::engine::EngineOptions;
use bucketsync_sync::registry::SessionRegistry;
use bucketsync_sync::session::WatchOptions;

use super::{build_engine, describe_event, spawn_shutdown_signal, Context, TargetArgs};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct WatchCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Do not reconcile when the session starts; only react to changes
    #[arg(long)]
    pub no_initial_sync: bool,

    /// Delete remote objects whose local file was removed
    #[arg(long)]
    pub delete_orphans: bool,
}

impl WatchCommand {
    fn watch_options(&self, ctx: &Context) -> WatchOptions {
        let mut options = WatchOptions::from_config(&ctx.config);
        if self.no_initial_sync {
            options.initial_sync = false;
        }
        options.delete_orphans |= self.delete_orphans;
        options
    }

    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let target = self.target.to_target()?;

        let engine = build_engine(&ctx.config, EngineOptions::from_config(&ctx.config));
        let registry = SessionRegistry::new(engine, self.watch_options(ctx));
        let mut events = registry.engine().subscribe();

        let shutdown = CancellationToken::new();
        spawn_shutdown_signal(shutdown.clone());

        let session_id = registry
            .start_watch(target.clone())
            .await
            .with_context(|| format!("Cannot watch {}", target.local_root))?;
        info!(session = %session_id, "Watching until interrupted");
        if ctx.format == OutputFormat::Human && !ctx.quiet {
            formatter.info("Press Ctrl+C to stop");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => print_event(formatter.as_ref(), ctx, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event printer fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        if ctx.format == OutputFormat::Human && !ctx.quiet {
            formatter.info("Stopping; waiting for the running batch");
        }
        registry.shutdown().await;

        // Report what finished while stopping
        while let Ok(event) = events.try_recv() {
            print_event(formatter.as_ref(), ctx, &event);
        }
        Ok(())
    }
}

fn print_event(formatter: &dyn OutputFormatter, ctx: &Context, event: &SyncEvent) {
    if ctx.format == OutputFormat::Json {
        if let Ok(value) = serde_json::to_value(event) {
            formatter.print_json(&value);
        }
        return;
    }

    let Some(line) = describe_event(event) else {
        return;
    };
    match event {
        SyncEvent::Error(_) => formatter.error(&line),
        SyncEvent::Completed(completed) if !completed.failures.is_empty() => {
            formatter.warn(&line);
            for failure in &completed.failures {
                formatter.info(&format!("  - {failure}"));
            }
        }
        SyncEvent::Completed(_) | SyncEvent::SessionStarted { .. } | SyncEvent::SessionStopped { .. } => {
            formatter.success(&line)
        }
        SyncEvent::Progress(_) if !ctx.quiet => formatter.info(&line),
        SyncEvent::Progress(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;
    use bucketsync_core::config::ConfigBuilder;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        watch: WatchCommand,
    }

    fn context(initial_sync: bool) -> Context {
        Context {
            format: OutputFormat::Human,
            quiet: false,
            config_path: PathBuf::from("/tmp/bucketsync.yaml"),
            config: ConfigBuilder::new()
                .watch_initial_sync(initial_sync)
                .watch_debounce_ms(500)
                .build(),
        }
    }

    #[test]
    fn test_no_initial_sync_flag_overrides_config() {
        let harness = Harness::try_parse_from([
            "watch",
            "--bucket",
            "b",
            "--local",
            "/tmp/w",
            "--no-initial-sync",
        ])
        .unwrap();

        let options = harness.watch.watch_options(&context(true));
        assert!(!options.initial_sync);
        assert_eq!(options.debounce.as_millis(), 500);
    }

    #[test]
    fn test_config_initial_sync_is_kept_without_flag() {
        let harness =
            Harness::try_parse_from(["watch", "--bucket", "b", "--local", "/tmp/w"]).unwrap();
        assert!(harness.watch.watch_options(&context(true)).initial_sync);
        assert!(!harness.watch.watch_options(&context(false)).initial_sync);
    }
}
