//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$PEC_CATALOG_CONFIG` (environment variable)
//! 2. `~/.config/pec-catalog/config.toml` (Linux/macOS)
//!    `%APPDATA%\pec-catalog\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

/// Default similarity ratio at which two subject buckets are merged.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Default display format for message dates.
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Subject clustering.
    pub grouping: GroupingConfig,
    /// Archive ingestion.
    pub ingest: IngestConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override the data directory (catalog, message records, attachments).
    pub data_dir: Option<PathBuf>,
    /// `strftime` format used for message dates in the catalog.
    pub date_format: String,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Subject clustering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Minimum similarity ratio (0.0–1.0) for two subjects to share a group.
    pub similarity_threshold: f64,
}

/// Archive ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Required file extension for uploaded archives (without the dot).
    pub upload_extension: String,
    /// Maximum size of a single envelope in bytes; longer messages are truncated.
    pub max_message_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl GeneralConfig {
    /// The configured date format, or [`DEFAULT_DATE_FORMAT`] when it holds an
    /// invalid `strftime` specifier.
    pub fn checked_date_format(&self) -> &str {
        if is_valid_date_format(&self.date_format) {
            &self.date_format
        } else {
            tracing::warn!(
                date_format = %self.date_format,
                fallback = DEFAULT_DATE_FORMAT,
                "Invalid date format in config, using default"
            );
            DEFAULT_DATE_FORMAT
        }
    }
}

/// Whether `format` parses as a `strftime` format chrono can render.
pub fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_extension: "mbox".to_string(),
            max_message_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

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

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("PEC_CATALOG_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("pec-catalog").join("config.toml"))
}

/// Return the data directory holding `catalog.json`, message records and attachments.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pec-catalog")
}

/// Return the directory where log files are written.
pub fn log_dir(config: &Config) -> PathBuf {
    data_dir(config).join("logs")
}
