//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILBINDER_CONFIG` (environment variable)
//! 2. `~/.config/mailbinder/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailbinder\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The file only carries raw values. [`ConversionOptions`] is the validated
//! form the conversion core consumes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::document::split::SplitPolicy;
use crate::error::{BinderError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Part boundaries for merged output.
    pub split: SplitConfig,
    /// Attachment handling.
    pub assembly: AssemblyConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
    /// Output artifacts.
    pub output: OutputConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Root under which the per-run scratch directory is created
    /// (default: the system temp directory).
    pub temp_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Part boundaries. Signed so that a negative value in the file is reported
/// as a policy error instead of a TOML type error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Maximum bytes per merged part (0 = unbounded).
    pub max_bytes_per_part: i64,
    /// Maximum pages per merged part (0 = unbounded).
    pub max_pages_per_part: i64,
}

/// Attachment handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Replace repeated PDF attachments within a part with a reference page.
    pub deduplicate_attachments: bool,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of worker threads (0 = number of available CPUs).
    pub workers: usize,
    /// Messages in flight per worker before submission blocks.
    pub queue_depth: usize,
    /// Maximum message size read from an archive, in bytes (default: 256 MB).
    pub max_message_size: usize,
}

/// Output artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write one PDF per message.
    pub per_message: bool,
    /// Write merged part PDFs.
    pub merge: bool,
    /// Write a text summary report into the output directory.
    pub report: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            temp_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            deduplicate_attachments: true,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_depth: 4,
            max_message_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            per_message: true,
            merge: false,
            report: false,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILBINDER_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailbinder").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailbinder")
}

// ── Validated options ───────────────────────────────────────────

/// Upper bound on submitted-but-undelivered messages; it sizes the pool's
/// channels.
pub const MAX_IN_FLIGHT: usize = 65_536;

/// Validated values consumed by the conversion core.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Part boundaries.
    pub split: SplitPolicy,
    /// When false, every PDF attachment is embedded and the ledger is bypassed.
    pub deduplicate_attachments: bool,
    /// Worker threads, always ≥ 1.
    pub workers: usize,
    /// Maximum submitted-but-undelivered messages, always ≥ `workers`.
    pub max_in_flight: usize,
    /// Largest message accepted from an MBOX archive.
    pub max_message_size: usize,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            split: SplitPolicy::unbounded(),
            deduplicate_attachments: true,
            workers: 1,
            max_in_flight: 4,
            max_message_size: 256 * 1024 * 1024,
        }
    }
}

impl ConversionOptions {
    /// Create a new builder starting from defaults.
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder {
            max_bytes: 0,
            max_pages: 0,
            deduplicate: true,
            workers: 1,
            queue_depth: 4,
            max_message_size: 256 * 1024 * 1024,
        }
    }

    /// Builder seeded from a loaded [`Config`]. `workers = 0` resolves to the
    /// number of available CPUs.
    pub fn from_config(config: &Config) -> ConversionOptionsBuilder {
        let workers = match config.performance.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        Self::builder()
            .max_bytes_per_part(config.split.max_bytes_per_part)
            .max_pages_per_part(config.split.max_pages_per_part)
            .deduplicate_attachments(config.assembly.deduplicate_attachments)
            .workers(workers)
            .queue_depth(config.performance.queue_depth)
            .max_message_size(config.performance.max_message_size)
    }
}

/// Builder for [`ConversionOptions`]. Raw values are kept as given and only
/// checked in [`ConversionOptionsBuilder::build`].
#[derive(Debug, Clone)]
pub struct ConversionOptionsBuilder {
    max_bytes: i64,
    max_pages: i64,
    deduplicate: bool,
    workers: usize,
    queue_depth: usize,
    max_message_size: usize,
}

impl ConversionOptionsBuilder {
    pub fn max_bytes_per_part(mut self, bytes: i64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn max_pages_per_part(mut self, pages: i64) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn deduplicate_attachments(mut self, v: bool) -> Self {
        self.deduplicate = v;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Validate and build. Fails before any processing starts.
    pub fn build(self) -> Result<ConversionOptions> {
        let split = SplitPolicy::new(self.max_bytes, self.max_pages)?;
        if self.workers == 0 {
            return Err(BinderError::InvalidConfig(
                "worker count must be ≥ 1".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(BinderError::InvalidConfig(
                "max_message_size must be > 0".into(),
            ));
        }
        let max_in_flight = self
            .workers
            .checked_mul(self.queue_depth.max(1))
            .filter(|n| *n <= MAX_IN_FLIGHT)
            .ok_or_else(|| {
                BinderError::InvalidConfig(format!(
                    "workers × queue_depth must be ≤ {MAX_IN_FLIGHT}, got {} × {}",
                    self.workers, self.queue_depth
                ))
            })?;
        Ok(ConversionOptions {
            split,
            deduplicate_attachments: self.deduplicate,
            workers: self.workers,
            max_in_flight,
            max_message_size: self.max_message_size,
        })
    }
}
