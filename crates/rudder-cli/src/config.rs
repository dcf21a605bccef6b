//! CLI settings
//!
//! Resolved in three layers: `<config_dir>/rudder/config.yaml`, then
//! `RUDDER_*` environment variables, then command-line flags.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CliError, Result};

/// Where release records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Kubernetes Secrets in the release namespace
    #[default]
    Secrets,
    /// Compressed JSON files under the data directory
    File,
    /// Process memory; nothing survives the command
    Memory,
}

/// Effective CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Namespace used when `--namespace` is not given
    pub namespace: String,

    pub driver: DriverKind,

    /// Base directory for the file driver
    pub data_dir: Option<PathBuf>,

    /// Default transition timeout, e.g. "5m"
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Records kept per release after upgrades and rollbacks
    pub max_history: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            driver: DriverKind::default(),
            data_dir: None,
            timeout: Duration::from_secs(300),
            max_history: Some(10),
        }
    }
}

impl Settings {
    /// `<config_dir>/rudder/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rudder").join("config.yaml"))
    }

    /// Load the config file (if present) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut settings = match path {
            Some(p) if p.is_file() => Self::from_file(&p)?,
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| CliError::config(format!("{}: {}", path.display(), e)))
    }

    fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply `RUDDER_NAMESPACE`, `RUDDER_DRIVER` and `RUDDER_DATA_DIR`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(ns) = lookup("RUDDER_NAMESPACE").filter(|s| !s.is_empty()) {
            self.namespace = ns;
        }
        if let Some(driver) = lookup("RUDDER_DRIVER").filter(|s| !s.is_empty()) {
            self.driver = DriverKind::from_str(&driver, true).map_err(|_| {
                CliError::config(format!(
                    "RUDDER_DRIVER must be one of secrets, file, memory (got '{}')",
                    driver
                ))
            })?;
        }
        if let Some(dir) = lookup("RUDDER_DATA_DIR").filter(|s| !s.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Directory used by the file driver
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("rudder").join("releases")))
            .unwrap_or_else(|| PathBuf::from(".rudder"))
    }
}
