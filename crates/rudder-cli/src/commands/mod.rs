//! CLI commands

pub mod completion;
pub mod diff;
pub mod history;
pub mod install;
pub mod list;
pub mod recover;
pub mod rollback;
pub mod status;
pub mod uninstall;
pub mod upgrade;

use clap::Args;
use rudder_core::{Values, parse_set_values};
use rudder_engine::Engine;
use rudder_kube::{
    FileDriver, KubeCluster, MemoryDriver, ReleaseManager, SecretsDriver, StorageConfig,
    StorageDriver,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::config::{DriverKind, Settings};
use crate::error::{CliError, Result};

/// `-f` and `--set`, shared by install and upgrade
#[derive(Debug, Args)]
pub struct ValuesArgs {
    /// Values file(s) to merge, in order
    #[arg(short = 'f', long = "values")]
    pub files: Vec<PathBuf>,

    /// Set values on the command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,
}

impl ValuesArgs {
    pub fn load(&self) -> Result<Values> {
        user_values(&self.files, &self.set)
    }
}

/// Flags shared by install, upgrade and rollback
#[derive(Debug, Args)]
pub struct TransitionFlags {
    /// Wait until every resource is ready
    #[arg(long)]
    pub wait: bool,

    /// Time allowed for each hook and for readiness, e.g. 90s or 5m
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Skip lifecycle hooks
    #[arg(long)]
    pub no_hooks: bool,

    /// Compute the release without touching the cluster or the store
    #[arg(long)]
    pub dry_run: bool,

    /// Description recorded on the new release version
    #[arg(long)]
    pub description: Option<String>,

    /// Release versions to keep (defaults to the configured value)
    #[arg(long)]
    pub max_history: Option<usize>,
}

impl TransitionFlags {
    pub fn timeout(&self, settings: &Settings) -> Result<chrono::Duration> {
        chrono_timeout(self.timeout.unwrap_or(settings.timeout))
    }

    pub fn max_history(&self, settings: &Settings) -> Option<usize> {
        self.max_history.or(settings.max_history).filter(|max| *max > 0)
    }
}

/// The manager every command talks to
pub type Manager = ReleaseManager<Box<dyn StorageDriver>, KubeCluster, Engine>;

/// Build the storage driver chosen in settings
pub async fn storage(settings: &Settings) -> Result<Box<dyn StorageDriver>> {
    let config = StorageConfig::default();
    let driver: Box<dyn StorageDriver> = match settings.driver {
        DriverKind::Secrets => Box::new(SecretsDriver::new(config).await?),
        DriverKind::File => Box::new(FileDriver::new(settings.data_dir(), config)?),
        DriverKind::Memory => Box::new(MemoryDriver::new()),
    };
    debug!(driver = driver.name(), "storage ready");
    Ok(driver)
}

pub async fn manager(settings: &Settings) -> Result<Manager> {
    Ok(ReleaseManager::new(
        storage(settings).await?,
        KubeCluster::new(),
        Engine::default(),
    ))
}

/// User-supplied values: `-f` files in order, then `--set`
///
/// Chart defaults are merged underneath by the manager.
pub fn user_values(files: &[PathBuf], set: &[String]) -> Result<Values> {
    let mut values = Values::new();
    for file in files {
        values.merge(&Values::from_file(file)?);
    }
    if !set.is_empty() {
        values.merge(&parse_set_values(set)?);
    }
    Ok(values)
}

/// Parse repeated `--label key=value` arguments
pub fn labels(args: &[String]) -> Result<BTreeMap<String, String>> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => Err(CliError::config(format!(
                "invalid label '{}', expected key=value",
                arg
            ))),
        })
        .collect()
}

pub fn chrono_timeout(timeout: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(timeout)
        .map_err(|_| CliError::config(format!("timeout {:?} is out of range", timeout)))
}

/// `--timeout` value parser: "90s", "5m", "1h30m"
pub fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_user_values_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.yaml");
        let b = tmp.path().join("b.yaml");
        fs::write(&a, "image:\n  tag: \"1.0\"\nreplicas: 1\n").unwrap();
        fs::write(&b, "replicas: 3\n").unwrap();

        let values = user_values(&[a, b], &["image.tag=v2".to_string()]).unwrap();

        assert_eq!(values.get("replicas"), Some(&serde_json::json!(3)));
        assert_eq!(values.get("image.tag"), Some(&serde_json::json!("v2")));
    }

    #[test]
    fn test_labels() {
        let parsed = labels(&["team=web".to_string(), "tier=".to_string()]).unwrap();
        assert_eq!(parsed["team"], "web");
        assert_eq!(parsed["tier"], "");

        assert!(labels(&["=x".to_string()]).is_err());
        assert!(labels(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timeout("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_timeout("soon").is_err());
        assert_eq!(
            chrono_timeout(Duration::from_secs(60)).unwrap(),
            chrono::Duration::minutes(1)
        );
    }
}
