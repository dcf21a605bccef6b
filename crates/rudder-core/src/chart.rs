//! Chart definition and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Chart API versions this loader understands
const SUPPORTED_API_VERSIONS: &[&str] = &["v1", "v2"];

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (v1 or v2)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Version of the packaged application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn default_api_version() -> String {
    "v2".to_string()
}

impl ChartMetadata {
    /// Minimal metadata, mostly useful in tests and dry runs
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            api_version: default_api_version(),
            name: name.into(),
            version,
            description: None,
            app_version: None,
            keywords: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// `name-version`, as shown in history and list output
    pub fn reference(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// Chart directory with resolved paths
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub metadata: ChartMetadata,

    /// Root directory of the chart
    pub root: PathBuf,

    pub templates_dir: PathBuf,

    /// `values.yaml` path, which may not exist
    pub values_path: PathBuf,
}

impl LoadedChart {
    /// Load a chart from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join("Chart.yaml");
        if !chart_file.exists() {
            return Err(CoreError::InvalidChart {
                message: format!("Chart.yaml not found in {}", root.display()),
            });
        }

        let content = std::fs::read_to_string(&chart_file)?;
        let metadata: ChartMetadata = serde_yaml::from_str(&content)?;

        if !SUPPORTED_API_VERSIONS.contains(&metadata.api_version.as_str()) {
            return Err(CoreError::InvalidChart {
                message: format!(
                    "Unsupported apiVersion: {}. Expected one of: {}",
                    metadata.api_version,
                    SUPPORTED_API_VERSIONS.join(", ")
                ),
            });
        }

        if metadata.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: "chart name must not be empty".to_string(),
            });
        }

        Ok(Self {
            metadata,
            templates_dir: root.join("templates"),
            values_path: root.join("values.yaml"),
            root,
        })
    }

    /// Default values shipped with the chart
    pub fn default_values(&self) -> Result<Values> {
        if self.values_path.exists() {
            Values::from_file(&self.values_path)
        } else {
            Ok(Values::new())
        }
    }

    /// Template files under `templates/`, sorted for deterministic rendering
    pub fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.templates_dir.exists() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(&self.templates_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if matches!(ext.as_str(), "yaml" | "yml" | "tpl" | "j2" | "txt" | "json") {
                    files.push(path.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_chart(dir: &Path, chart_yaml: &str) {
        std::fs::write(dir.join("Chart.yaml"), chart_yaml).unwrap();
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(
            dir.join("templates/configmap.yaml"),
            "kind: ConfigMap\n",
        )
        .unwrap();
        std::fs::write(dir.join("templates/_helpers.tpl"), "").unwrap();
        std::fs::write(dir.join("templates/README.md"), "ignored").unwrap();
    }

    #[test]
    fn test_load_chart() {
        let tmp = TempDir::new().unwrap();
        write_chart(
            tmp.path(),
            "apiVersion: v2\nname: web\nversion: 1.2.3\nappVersion: \"4.5\"\n",
        );
        std::fs::write(tmp.path().join("values.yaml"), "replicas: 2\n").unwrap();

        let chart = LoadedChart::load(tmp.path()).unwrap();
        assert_eq!(chart.metadata.name, "web");
        assert_eq!(chart.metadata.version, Version::new(1, 2, 3));
        assert_eq!(chart.metadata.app_version.as_deref(), Some("4.5"));
        assert_eq!(chart.metadata.reference(), "web-1.2.3");
        assert_eq!(chart.default_values().unwrap().get("replicas").unwrap(), 2);

        let files = chart.template_files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("_helpers.tpl"));
    }

    #[test]
    fn test_missing_values_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        write_chart(tmp.path(), "name: web\nversion: 0.1.0\n");
        let chart = LoadedChart::load(tmp.path()).unwrap();
        assert!(chart.default_values().unwrap().is_empty());
    }

    #[test]
    fn test_missing_chart_dir() {
        let err = LoadedChart::load("/nonexistent/chart").unwrap_err();
        assert!(matches!(err, CoreError::ChartNotFound { .. }));
    }

    #[test]
    fn test_unsupported_api_version() {
        let tmp = TempDir::new().unwrap();
        write_chart(tmp.path(), "apiVersion: v9\nname: web\nversion: 0.1.0\n");
        let err = LoadedChart::load(tmp.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_invalid_version() {
        let tmp = TempDir::new().unwrap();
        write_chart(tmp.path(), "name: web\nversion: not-semver\n");
        assert!(LoadedChart::load(tmp.path()).is_err());
    }
}
