//! Application configuration
//!
//! Loaded from a single YAML file: where the store lives, where source
//! descriptors are found, which mapped table requests a rescan, and the
//! settings that command placeholders resolve against.

use crate::settings::{Setting, StaticSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

/// Mapped table whose writes request an immediate follow-up scan.
pub const DEFAULT_RESCAN_TABLE: &str = "CurrentScan";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Configuration error: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database path; the platform data directory when absent
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Directory holding one sub-directory per source
    #[serde(default = "default_sources_dir")]
    pub sources_dir: PathBuf,

    #[serde(default = "default_rescan_table")]
    pub rescan_table: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Settings available to `{placeholder}` resolution
    #[serde(default)]
    pub settings: BTreeMap<String, Setting>,
}

fn default_sources_dir() -> PathBuf {
    PathBuf::from("sources")
}

fn default_rescan_table() -> String {
    DEFAULT_RESCAN_TABLE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            sources_dir: default_sources_dir(),
            rescan_table: default_rescan_table(),
            log_level: default_log_level(),
            settings: BTreeMap::new(),
        }
    }
}

/// Parse a log level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    level
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(format!("unknown log_level {:?}", level)))
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rescan_table.trim().is_empty() {
            return Err(ConfigError::invalid("rescan_table cannot be empty"));
        }
        if self.settings.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::invalid("setting names cannot be empty"));
        }
        parse_log_level(&self.log_level)?;
        Ok(())
    }

    /// The database path, falling back to `<data dir>/scanledger/scanledger.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            let data_dir = dirs::data_dir()
                .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
            data_dir.join("scanledger").join("scanledger.db")
        })
    }

    pub fn settings_provider(&self) -> StaticSettings {
        StaticSettings::new(self.settings.clone())
    }
}
