//! File-based storage driver
//!
//! Stores one compressed JSON file per release version under
//! `<base_dir>/<namespace>/<name>/v<version>.json`. Useful for:
//! - Development and testing without a Kubernetes cluster
//! - Offline scenarios

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{StorageConfig, StorageDriver, decode_release, encode_release};
use crate::error::{KubeError, Result};
use crate::release::Release;

/// File-based storage driver
pub struct FileDriver {
    /// Base directory for storing releases
    base_dir: PathBuf,
    config: StorageConfig,
}

impl FileDriver {
    /// Create a new file driver, creating the base directory if needed
    pub fn new(base_dir: impl Into<PathBuf>, config: StorageConfig) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir, config })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn release_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.base_dir.join(namespace).join(name)
    }

    fn release_path(&self, namespace: &str, name: &str, version: u32) -> PathBuf {
        self.release_dir(namespace, name)
            .join(format!("v{}.json", version))
    }

    fn read_release(path: &Path) -> Result<Release> {
        let data = std::fs::read(path)?;
        decode_release(&data)
    }

    /// Versions stored in a release directory, ascending
    fn versions_in(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|p| {
                let version = p
                    .file_name()?
                    .to_str()?
                    .strip_prefix('v')?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()?;
                Some((version, p))
            })
            .collect();
        versions.sort_by_key(|(v, _)| *v);
        Ok(versions)
    }

    fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        Ok(std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect())
    }

    fn read_dir_releases(dir: &Path) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for (_, path) in Self::versions_in(dir)? {
            match Self::read_release(&path) {
                Ok(release) => releases.push(release),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable release file"),
            }
        }
        Ok(releases)
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn create(&self, release: &Release) -> Result<()> {
        let path = self.release_path(&release.namespace, &release.name, release.version);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Written aside, then linked in place; linking never replaces a file
        let data = encode_release(release, self.config.compression)?;
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        if let Err(e) = std::fs::write(&tmp, data) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        let linked = std::fs::hard_link(&tmp, &path);
        let _ = std::fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "already exists",
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let path = self.release_path(&release.namespace, &release.name, release.version);
        if !path.is_file() {
            return Err(KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "does not exist",
            });
        }

        let data = encode_release(release, self.config.compression)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        let path = self.release_path(namespace, name, version);
        if !path.is_file() {
            return Err(KubeError::version_not_found(name, version));
        }
        Self::read_release(&path)
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        Self::read_dir_releases(&self.release_dir(namespace, name))
    }

    async fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Release>> {
        let namespaces = match namespace {
            Some(ns) => vec![self.base_dir.join(ns)],
            None => Self::subdirs(&self.base_dir)?,
        };

        let mut releases = Vec::new();
        for ns_dir in namespaces {
            for name_dir in Self::subdirs(&ns_dir)? {
                releases.extend(Self::read_dir_releases(&name_dir)?);
            }
        }
        Ok(releases)
    }

    async fn delete(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        let release = self.get(namespace, name, version).await?;
        std::fs::remove_file(self.release_path(namespace, name, version))?;

        // Clean up empty directories
        let name_dir = self.release_dir(namespace, name);
        if std::fs::read_dir(&name_dir)?.next().is_none() {
            let _ = std::fs::remove_dir(&name_dir);
        }

        Ok(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Status;
    use crate::storage::CompressionMethod;
    use rudder_core::{ChartMetadata, Values};
    use tempfile::TempDir;

    fn release(name: &str, version: u32) -> Release {
        let mut r = Release::new(
            name,
            "default",
            version,
            ChartMetadata::new("demo", semver::Version::new(1, 0, 0)),
            Values::new(),
            Status::Deployed,
            "Install complete",
        );
        r.manifest = "apiVersion: v1\nkind: ConfigMap\n".to_string();
        r
    }

    fn driver(tmp: &TempDir) -> FileDriver {
        FileDriver::new(tmp.path(), StorageConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        let rel = release("myapp", 1);
        driver.create(&rel).await.unwrap();

        assert!(tmp.path().join("default/myapp/v1.json").is_file());
        assert_eq!(driver.get("default", "myapp", 1).await.unwrap(), rel);
    }

    #[tokio::test]
    async fn test_create_conflict_and_update_missing() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);
        let rel = release("myapp", 1);

        assert!(matches!(
            driver.update(&rel).await,
            Err(KubeError::StoreConflict { .. })
        ));
        driver.create(&rel).await.unwrap();
        assert!(matches!(
            driver.create(&rel).await,
            Err(KubeError::StoreConflict { .. })
        ));

        let mut superseded = rel.clone();
        superseded.mark_superseded();
        driver.update(&superseded).await.unwrap();
        assert_eq!(
            driver.get("default", "myapp", 1).await.unwrap().info.status,
            Status::Superseded
        );
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_create_leaves_only_complete_records() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);
        let dir = tmp.path().join("default/myapp");

        driver.create(&release("myapp", 1)).await.unwrap();
        assert!(driver.create(&release("myapp", 1)).await.is_err());
        assert_eq!(files_in(&dir), vec!["v1.json"]);

        // Leftover from an interrupted write
        std::fs::write(dir.join("v2.json.4242.tmp"), b"\x28\xb5").unwrap();
        assert_eq!(driver.history("default", "myapp").await.unwrap().len(), 1);

        driver.create(&release("myapp", 2)).await.unwrap();
        let versions: Vec<u32> = driver
            .history("default", "myapp")
            .await
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_history_is_ascending_numerically() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        for v in [2, 10, 1] {
            driver.create(&release("myapp", v)).await.unwrap();
        }

        let versions: Vec<u32> = driver
            .history("default", "myapp")
            .await
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 10]);
        assert!(driver.history("default", "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_latest_per_name() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        driver.create(&release("app1", 1)).await.unwrap();
        driver.create(&release("app1", 2)).await.unwrap();
        driver.create(&release("app2", 1)).await.unwrap();

        assert_eq!(driver.list_all(Some("default")).await.unwrap().len(), 3);
        let latest = driver.list(None).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].name, "app1");
        assert_eq!(latest[0].version, 2);
    }

    #[tokio::test]
    async fn test_reads_files_written_with_other_compression() {
        let tmp = TempDir::new().unwrap();
        let gzip = FileDriver::new(
            tmp.path(),
            StorageConfig {
                compression: CompressionMethod::Gzip { level: 6 },
            },
        )
        .unwrap();
        gzip.create(&release("myapp", 1)).await.unwrap();

        let zstd = driver(&tmp);
        assert_eq!(zstd.get("default", "myapp", 1).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let driver = driver(&tmp);

        driver.create(&release("myapp", 1)).await.unwrap();
        driver.delete("default", "myapp", 1).await.unwrap();

        assert!(matches!(
            driver.get("default", "myapp", 1).await,
            Err(KubeError::NotFound { .. })
        ));
        assert!(!tmp.path().join("default/myapp").exists());
    }
}
