//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/keystash/config.toml)
//! 3. Environment variables (KEYSTASH_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::events::EmitMode;

/// Environment variable prefix
const ENV_PREFIX: &str = "KEYSTASH";

/// Which backend [`DataStorage::open`](crate::DataStorage::open) builds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Nothing survives the process
    Memory,
    /// One JSON document under `data_dir`
    #[default]
    File,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            other => Err(format!(
                "unknown backend '{}' (expected 'memory' or 'file')",
                other
            )),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Backend used by `DataStorage::open`
    #[serde(default)]
    pub backend: BackendKind,

    /// File name of the JSON store inside `data_dir`
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Event emission mode
    #[serde(default)]
    pub emit_mode: EmitMode,

    /// Operations per chunk when executing batches
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Pause between batch chunks, in milliseconds
    #[serde(default)]
    pub batch_delay_ms: u64,

    /// Log file path (defaults to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: BackendKind::default(),
            file_name: default_file_name(),
            emit_mode: EmitMode::default(),
            max_batch_size: default_max_batch_size(),
            batch_delay_ms: 0,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (KEYSTASH_DATA_DIR, KEYSTASH_BACKEND, ...)
    /// 2. Config file (~/.config/keystash/config.toml or KEYSTASH_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path over the default one
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_var("BACKEND") {
            self.backend = val
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid {}_BACKEND", ENV_PREFIX))?;
        }

        if let Some(val) = env_var("EMIT_MODE") {
            self.emit_mode = val
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid {}_EMIT_MODE", ENV_PREFIX))?;
        }

        if let Some(val) = env_var("MAX_BATCH_SIZE") {
            self.max_batch_size = val
                .parse()
                .with_context(|| format!("Invalid {}_MAX_BATCH_SIZE: {}", ENV_PREFIX, val))?;
        }

        if let Some(val) = env_var("BATCH_DELAY_MS") {
            self.batch_delay_ms = val
                .parse()
                .with_context(|| format!("Invalid {}_BATCH_DELAY_MS: {}", ENV_PREFIX, val))?;
        }

        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if self.backend == BackendKind::File && !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with KEYSTASH_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keystash")
            .join("config.toml")
    }

    /// Get the path to the JSON store file
    pub fn data_file_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    /// Batch execution settings
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions::new()
            .max_batch_size(self.max_batch_size)
            .delay_between_batches(Duration::from_millis(self.batch_delay_ms))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keystash")
}

fn default_file_name() -> String {
    "store.json".to_string()
}

fn default_max_batch_size() -> usize {
    BatchOptions::DEFAULT_MAX_BATCH_SIZE
}
