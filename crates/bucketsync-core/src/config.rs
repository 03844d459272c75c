//! Configuration module for bucketsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::operation::SyncDirection;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for bucketsync.
///
/// Every section falls back to its defaults when omitted from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
    /// Storage profiles keyed by profile name.
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// One-shot synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum number of operations running at once within a batch.
    pub concurrency: usize,
    /// Direction used by `bucketsync sync` when none is given.
    pub direction: SyncDirection,
    /// Delete destination entries that no longer exist on the source side.
    pub delete_orphans: bool,
    /// Remote objects without a reusable ETag are downloaded and hashed up to
    /// this size (in MiB); larger ones are compared by size and timestamp.
    pub remote_hash_threshold_mb: u64,
}

/// Watch session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period (ms) after the last file event before a reconciliation runs.
    pub debounce_ms: u64,
    /// How often (ms) the session checks whether the debounce window elapsed.
    pub poll_interval_ms: u64,
    /// Upper bound (ms) on how long a continuous burst can postpone a run.
    pub max_delay_ms: u64,
    /// Run one reconciliation right after the session starts watching.
    pub initial_sync: bool,
    /// Capacity of the per-session file event channel.
    pub event_buffer: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON log lines instead of human-readable text.
    pub json: bool,
}

/// Connection settings of a storage profile.
///
/// Credentials are not stored here; they come from the standard AWS
/// provider chain (environment, shared credentials file, instance metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub endpoint: Option<String>,
    /// Region name; `None` uses the provider chain's region.
    pub region: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: bool,
    /// Single-part ETags are the content MD5. Turn off for services (or
    /// SSE-KMS / SSE-C buckets) whose ETags are opaque, so objects are
    /// hashed or compared by size and timestamp instead.
    pub etag_is_md5: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            force_path_style: false,
            etag_is_md5: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/bucketsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bucketsync")
            .join("config.yaml")
    }

    /// Byte threshold derived from `sync.remote_hash_threshold_mb`.
    pub fn remote_hash_threshold_bytes(&self) -> u64 {
        self.sync.remote_hash_threshold_mb.saturating_mul(1024 * 1024)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            direction: SyncDirection::LocalToRemote,
            delete_orphans: false,
            remote_hash_threshold_mb: 16,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            poll_interval_ms: 50,
            max_delay_ms: 5000,
            initial_sync: true,
            event_buffer: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"watch.debounce_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.concurrency == 0 {
            errors.push(ValidationError {
                field: "sync.concurrency".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- watch ---
        if self.watch.debounce_ms == 0 {
            errors.push(ValidationError {
                field: "watch.debounce_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.watch.poll_interval_ms == 0 {
            errors.push(ValidationError {
                field: "watch.poll_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.watch.poll_interval_ms > self.watch.debounce_ms {
            errors.push(ValidationError {
                field: "watch.poll_interval_ms".into(),
                message: format!(
                    "must not exceed watch.debounce_ms ({})",
                    self.watch.debounce_ms
                ),
            });
        }
        if self.watch.max_delay_ms < self.watch.debounce_ms {
            errors.push(ValidationError {
                field: "watch.max_delay_ms".into(),
                message: format!(
                    "must be at least watch.debounce_ms ({})",
                    self.watch.debounce_ms
                ),
            });
        }
        if self.watch.event_buffer == 0 {
            errors.push(ValidationError {
                field: "watch.event_buffer".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- profiles ---
        for (name, profile) in &self.profiles {
            if name.trim().is_empty() {
                errors.push(ValidationError {
                    field: "profiles".into(),
                    message: "profile names must not be empty".into(),
                });
            }
            if let Some(endpoint) = &profile.endpoint {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    errors.push(ValidationError {
                        field: format!("profiles.{name}.endpoint"),
                        message: format!("must be an http(s) URL, got '{endpoint}'"),
                    });
                }
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use bucketsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_concurrency(8)
///     .watch_debounce_ms(500)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_concurrency(mut self, n: usize) -> Self {
        self.config.sync.concurrency = n;
        self
    }

    pub fn sync_direction(mut self, direction: SyncDirection) -> Self {
        self.config.sync.direction = direction;
        self
    }

    pub fn sync_delete_orphans(mut self, delete: bool) -> Self {
        self.config.sync.delete_orphans = delete;
        self
    }

    pub fn sync_remote_hash_threshold_mb(mut self, mb: u64) -> Self {
        self.config.sync.remote_hash_threshold_mb = mb;
        self
    }

    // --- watch ---

    pub fn watch_debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    pub fn watch_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.watch.poll_interval_ms = ms;
        self
    }

    pub fn watch_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.watch.max_delay_ms = ms;
        self
    }

    pub fn watch_initial_sync(mut self, enabled: bool) -> Self {
        self.config.watch.initial_sync = enabled;
        self
    }

    pub fn watch_event_buffer(mut self, capacity: usize) -> Self {
        self.config.watch.event_buffer = capacity;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- profiles ---

    pub fn profile(mut self, name: impl Into<String>, profile: ProfileConfig) -> Self {
        self.config.profiles.insert(name.into(), profile);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
