use crate::errors::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for the config directory.
pub const APP_NAME: &str = "nidhogg";

/// Where conversations land when neither the caller nor the config names a directory.
pub const DEFAULT_OUT_DIR: &str = "./conversations";

/// Configuration for the Nidhogg server
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct NidhoggConfig {
    pub out_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl NidhoggConfig {
    pub fn new(out_dir: Option<PathBuf>, log_level: Option<String>) -> Self {
        Self { out_dir, log_level }
    }

    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, path)
    }

    /// Loads a config file the user named explicitly. A missing file is an error.
    pub fn load_required(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> CoreResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            CoreError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Merges this config with another config, preferring values from the other config if present
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            out_dir: other.out_dir.clone().or_else(|| self.out_dir.clone()),
            log_level: other.log_level.clone().or_else(|| self.log_level.clone()),
        }
    }

    /// Directory used when a save request carries no `out_dir`.
    pub fn resolved_out_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR))
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir() -> CoreResult<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        CoreError::ConfigError("Could not determine config directory".to_string())
    })?;

    Ok(config_dir.join(APP_NAME))
}

/// Helper function to get default config file path
pub fn get_default_config_file() -> CoreResult<PathBuf> {
    let config_dir = get_default_config_dir()?;
    Ok(config_dir.join("config.toml"))
}
