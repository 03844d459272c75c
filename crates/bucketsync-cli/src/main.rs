//! bucketsync CLI - Command-line interface for bucketsync
//!
//! Provides commands for:
//! - One-shot synchronization between a folder and a bucket prefix
//! - Watching a folder and uploading changes as they settle
//! - Inspecting and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bucketsync_core::config::Config;

mod commands;
mod output;

use commands::{config::ConfigCommand, sync::SyncCommand, watch::WatchCommand, Context};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "bucketsync",
    version,
    about = "Keep local folders in sync with S3-compatible buckets"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile a folder and a bucket prefix once
    Sync(SyncCommand),
    /// Watch a folder and upload changes until interrupted
    Watch(WatchCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Log level from the command line, falling back to the config file
fn log_level(cli: &Cli, config: &Config) -> String {
    if cli.quiet {
        return "warn".to_string();
    }
    match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    // Setup tracing; RUST_LOG wins over flags and config
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(&cli, &config)));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = Context {
        format,
        quiet: cli.quiet,
        config_path,
        config,
    };

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Watch(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
