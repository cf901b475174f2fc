//! Configuration file parser for ~/.config/gator/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. Every value is validated before the scheduler
//! starts, so a bad interval never reaches the network.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::util::{parse_duration, DurationError};

/// Default cadence between refresh cycles
pub const DEFAULT_REFRESH_INTERVAL: &str = "1m0s";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// The refresh interval is malformed, zero or negative.
    #[error("Invalid refresh interval {value:?}: {reason}")]
    InvalidInterval { value: String, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gator.db` beside the config file.
    pub database_path: Option<PathBuf>,

    /// Owner recorded on feeds registered through the CLI.
    pub current_user: String,

    /// Time between refresh cycles, e.g. "30s", "1m0s", "1h".
    pub refresh_interval: String,

    /// Per-request timeout for feed fetches, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user: "gator".to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading so a corrupted file cannot exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "database_path",
                "current_user",
                "refresh_interval",
                "request_timeout_secs",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval = %config.refresh_interval,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The configured refresh interval, validated.
    pub fn refresh_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.refresh_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Parse a refresh interval such as `"1m0s"`.
///
/// Malformed, zero and negative values are all `ConfigError::InvalidInterval`.
pub fn parse_interval(value: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidInterval {
        value: value.to_string(),
        reason,
    };

    match parse_duration(value) {
        Ok(d) if d.is_zero() => Err(invalid("interval must be positive".to_string())),
        Ok(d) => Ok(d),
        Err(DurationError::Negative) => Err(invalid("interval must be positive".to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
