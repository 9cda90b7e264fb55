//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::chanserv::ChanServConfig;
use super::flags::FlagBlock;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Services configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Services identity.
    pub services: ServicesConfig,
    /// Database file and save schedule.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Channel registration and access list settings.
    #[serde(default)]
    pub chanserv: ChanServConfig,
    /// Extra access flags registered on top of the core set.
    #[serde(default)]
    pub flags: Vec<FlagBlock>,
    /// Log output settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Services identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Services server name (e.g., "services.straylight.net").
    pub name: String,
    /// Network name (e.g., "Straylight").
    pub network: String,
    /// Treat unknown and malformed database rows as fatal.
    #[serde(default)]
    pub strict_mode: bool,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the flat-file database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Seconds between periodic saves (default: 300).
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,
    /// Suffix of the temporary file written before the rename.
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            save_interval_secs: default_save_interval(),
            temp_suffix: default_temp_suffix(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("services.db")
}

fn default_save_interval() -> u64 {
    300
}

fn default_temp_suffix() -> String {
    ".new".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
