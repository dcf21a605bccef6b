//! Release records and their status machine

use chrono::{DateTime, Duration, Utc};
use rudder_core::{ChartMetadata, Values};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::hooks::Hook;

/// Default timeout for pending operations (5 minutes)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::minutes(5);

/// A stored release: one version of a named deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name
    pub name: String,

    /// Kubernetes namespace
    pub namespace: String,

    /// Revision number, contiguous from 1 for a given name
    pub version: u32,

    /// Status and timestamps
    pub info: DeployInfo,

    /// Chart metadata at deploy time
    pub chart: ChartMetadata,

    /// Computed values (chart defaults coalesced with user values)
    pub values: Values,

    /// Rendered manifest, hooks excluded
    pub manifest: String,

    /// Hooks rendered for this version
    #[serde(default)]
    pub hooks: Vec<Hook>,

    /// Custom labels for filtering
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Rendered NOTES.txt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Status block of a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployInfo {
    pub status: Status,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_deployed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,
    /// Last time the status changed; drives stuck detection
    pub last_modified: DateTime<Utc>,
    /// How long a pending status may last before the release counts as stuck
    #[serde(with = "duration_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

impl DeployInfo {
    pub fn new(status: Status, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            first_deployed: None,
            last_deployed: None,
            deleted: None,
            last_modified: Utc::now(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Release status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Unknown,
    Deployed,
    Deleted,
    Superseded,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    PendingDelete,
}

impl Status {
    /// Transitional statuses written at the start of an operation
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback | Self::PendingDelete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Deleted => "deleted",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
            Self::PendingDelete => "pending-delete",
        }
    }

    /// Parse the kebab-case form used in labels and on the command line
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "unknown" => Self::Unknown,
            "deployed" => Self::Deployed,
            "deleted" | "uninstalled" => Self::Deleted,
            "superseded" => Self::Superseded,
            "failed" => Self::Failed,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" => Self::PendingUpgrade,
            "pending-rollback" => Self::PendingRollback,
            "pending-delete" => Self::PendingDelete,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Release {
    /// A fresh record in the given pending status
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        version: u32,
        chart: ChartMetadata,
        values: Values,
        status: Status,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version,
            info: DeployInfo::new(status, description),
            chart,
            values,
            manifest: String::new(),
            hooks: Vec::new(),
            labels: BTreeMap::new(),
            notes: None,
        }
    }

    /// Storage key for this release
    pub fn storage_key(&self) -> String {
        storage_key(&self.name, self.version)
    }

    pub fn status(&self) -> Status {
        self.info.status
    }

    /// A pending status that outlived its timeout
    pub fn is_stuck(&self) -> bool {
        self.info.status.is_pending()
            && Utc::now().signed_duration_since(self.info.last_modified) > self.info.timeout
    }

    pub fn mark_pending(&mut self, status: Status, description: impl Into<String>) {
        self.info.status = status;
        self.info.description = description.into();
        self.info.last_modified = Utc::now();
    }

    /// Mark deployed; keeps an existing description unless one is given
    pub fn mark_deployed(&mut self, description: Option<&str>) {
        let now = Utc::now();
        self.info.status = Status::Deployed;
        if let Some(desc) = description {
            self.info.description = desc.to_string();
        }
        self.info.first_deployed.get_or_insert(now);
        self.info.last_deployed = Some(now);
        self.info.last_modified = now;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.info.status = Status::Failed;
        self.info.description = reason.into();
        self.info.last_modified = Utc::now();
    }

    pub fn mark_superseded(&mut self) {
        self.info.status = Status::Superseded;
        self.info.last_modified = Utc::now();
    }

    pub fn mark_deleted(&mut self, description: impl Into<String>) {
        let now = Utc::now();
        self.info.status = Status::Deleted;
        self.info.description = description.into();
        self.info.deleted = Some(now);
        self.info.last_modified = now;
    }
}

/// Storage key for a release version
pub fn storage_key(name: &str, version: u32) -> String {
    format!("sh.rudder.release.v1.{}.v{}", name, version)
}

/// Serialization helper for chrono::Duration
pub(crate) mod duration_serde {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.num_seconds().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(seconds))
    }
}
