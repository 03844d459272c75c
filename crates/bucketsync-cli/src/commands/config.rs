//! Config command - View and manage bucketsync configuration
//!
//! Provides the `bucketsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the path of the configuration file in use

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use tracing::info;

use bucketsync_core::config::{Config, ProfileConfig};
use bucketsync_core::domain::SyncDirection;

use super::Context;
use crate::output::{get_formatter, OutputFormat};

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.concurrency", "Transfers running at once"),
    ("sync.direction", "local_to_remote|remote_to_local|bidirectional"),
    ("sync.delete_orphans", "true|false"),
    ("sync.remote_hash_threshold_mb", "Hash remote objects up to this size (MiB)"),
    ("watch.debounce_ms", "Quiet period before a batch runs"),
    ("watch.poll_interval_ms", "How often the quiet period is checked"),
    ("watch.max_delay_ms", "Longest a burst of changes can postpone a batch"),
    ("watch.initial_sync", "true|false"),
    ("watch.event_buffer", "Buffered file events per session"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
    ("profiles.<name>.endpoint", "S3-compatible endpoint URL, or none"),
    ("profiles.<name>.region", "Region name, or none"),
    ("profiles.<name>.force_path_style", "true|false"),
    ("profiles.<name>.etag_is_md5", "true|false; false for opaque ETags"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "watch.debounce_ms")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => self.execute_path(ctx),
        }
    }

    fn execute_show(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.format == OutputFormat::Json {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(&self, ctx: &Context, key: &str, value: &str) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let config_path = &ctx.config_path;
        let mut config = ctx.config.clone();

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.format == OutputFormat::Human {
                formatter.info("Supported keys:");
                for (key, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {key:<36} - {help}"));
                }
            }
            return Err(e.context(format!("Failed to set '{key}'")));
        }

        // Validate the new config before saving
        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!("Invalid value for '{key}': {}", messages.join("; "));
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

        if ctx.format == OutputFormat::Json {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {key} = {value}"));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let config_path = &ctx.config_path;

        // Load explicitly: a parse error must not fall back to defaults here
        let config = match Config::load(config_path) {
            Ok(config) => config,
            Err(_) if !config_path.exists() => {
                if ctx.format == OutputFormat::Json {
                    formatter.print_json(&serde_json::json!({
                        "valid": true,
                        "config_path": config_path.display().to_string(),
                        "errors": [],
                        "defaults": true,
                    }));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.success("Using default configuration");
                }
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Failed to parse configuration file {}",
                    config_path.display()
                )));
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.format == OutputFormat::Json {
            let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!("configuration is invalid")
        }
    }

    fn execute_path(&self, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        if ctx.format == OutputFormat::Json {
            formatter.print_json(&serde_json::json!({
                "config_path": ctx.config_path.display().to_string(),
                "exists": ctx.config_path.exists(),
            }));
        } else {
            println!("{}", ctx.config_path.display());
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .with_context(|| format!("Expected true or false for {key}"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Expected a positive integer for {key}"))
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Apply a dot-notation key/value pair to a Config struct
///
/// Profile keys create the profile when it does not exist yet.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.concurrency" => config.sync.concurrency = parse_number(key, value)?,
        "sync.direction" => config.sync.direction = value.parse::<SyncDirection>()?,
        "sync.delete_orphans" => config.sync.delete_orphans = parse_bool(key, value)?,
        "sync.remote_hash_threshold_mb" => {
            config.sync.remote_hash_threshold_mb = parse_number(key, value)?;
        }

        // --- watch ---
        "watch.debounce_ms" => config.watch.debounce_ms = parse_number(key, value)?,
        "watch.poll_interval_ms" => config.watch.poll_interval_ms = parse_number(key, value)?,
        "watch.max_delay_ms" => config.watch.max_delay_ms = parse_number(key, value)?,
        "watch.initial_sync" => config.watch.initial_sync = parse_bool(key, value)?,
        "watch.event_buffer" => config.watch.event_buffer = parse_number(key, value)?,

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = parse_bool(key, value)?,

        // --- profiles ---
        _ if key.starts_with("profiles.") => {
            let rest = &key["profiles.".len()..];
            let Some((name, field)) = rest.rsplit_once('.') else {
                bail!("Expected profiles.<name>.<field>, got '{key}'");
            };
            if name.is_empty() {
                bail!("Profile name must not be empty");
            }
            let profile = config
                .profiles
                .entry(name.to_string())
                .or_insert_with(ProfileConfig::default);
            match field {
                "endpoint" => profile.endpoint = optional(value),
                "region" => profile.region = optional(value),
                "force_path_style" => profile.force_path_style = parse_bool(key, value)?,
                "etag_is_md5" => profile.etag_is_md5 = parse_bool(key, value)?,
                _ => bail!("Unknown profile field: '{field}'"),
            }
        }

        _ => bail!("Unknown configuration key: '{key}'"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn context(path: PathBuf) -> Context {
        Context {
            format: OutputFormat::Json,
            quiet: true,
            config: Config::load_or_default(&path),
            config_path: path,
        }
    }

    #[test]
    fn test_apply_sync_values() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.concurrency", "8").unwrap();
        apply_config_value(&mut config, "sync.direction", "remote-to-local").unwrap();
        apply_config_value(&mut config, "sync.delete_orphans", "true").unwrap();
        assert_eq!(config.sync.concurrency, 8);
        assert_eq!(config.sync.direction, SyncDirection::RemoteToLocal);
        assert!(config.sync.delete_orphans);
    }

    #[test]
    fn test_apply_watch_values() {
        let mut config = Config::default();
        apply_config_value(&mut config, "watch.debounce_ms", "500").unwrap();
        apply_config_value(&mut config, "watch.initial_sync", "false").unwrap();
        assert_eq!(config.watch.debounce_ms, 500);
        assert!(!config.watch.initial_sync);
    }

    #[test]
    fn test_apply_profile_creates_entry() {
        let mut config = Config::default();
        apply_config_value(&mut config, "profiles.minio.endpoint", "http://localhost:9000")
            .unwrap();
        apply_config_value(&mut config, "profiles.minio.force_path_style", "true").unwrap();

        let profile = &config.profiles["minio"];
        assert_eq!(profile.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(profile.force_path_style);
        assert!(profile.etag_is_md5);

        apply_config_value(&mut config, "profiles.minio.etag_is_md5", "false").unwrap();
        assert!(!config.profiles["minio"].etag_is_md5);

        apply_config_value(&mut config, "profiles.minio.endpoint", "none").unwrap();
        assert!(config.profiles["minio"].endpoint.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_input() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.concurrency", "many").is_err());
        assert!(apply_config_value(&mut config, "sync.direction", "sideways").is_err());
        assert!(apply_config_value(&mut config, "nope.key", "1").is_err());
        assert!(apply_config_value(&mut config, "profiles.minio.colour", "x").is_err());
        assert!(apply_config_value(&mut config, "profiles.endpoint", "x").is_err());
    }

    #[tokio::test]
    async fn test_set_then_validate_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.yaml");

        ConfigCommand::Set {
            key: "watch.debounce_ms".to_string(),
            value: "450".to_string(),
        }
        .execute(&context(path.clone()))
        .await
        .unwrap();

        let saved = Config::load(&path).unwrap();
        assert_eq!(saved.watch.debounce_ms, 450);
        ConfigCommand::Validate
            .execute(&context(path))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let result = ConfigCommand::Set {
            key: "sync.concurrency".to_string(),
            value: "0".to_string(),
        }
        .execute(&context(path.clone()))
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_validate_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync: [not, a, map]").unwrap();

        assert!(ConfigCommand::Validate
            .execute(&context(path))
            .await
            .is_err());
    }
}
