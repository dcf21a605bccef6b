//! Options for install, upgrade, rollback and uninstall transitions

use chrono::Duration;
use std::collections::BTreeMap;

use crate::release::DEFAULT_OPERATION_TIMEOUT;

/// Options for install
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Wait for resources to be ready before running post-install hooks
    pub wait: bool,

    /// Bound for each hook and for the readiness wait
    pub timeout: Duration,

    /// Skip every hook
    pub disable_hooks: bool,

    /// Compute the release without touching the store or the cluster
    pub dry_run: bool,

    /// Description recorded instead of "Install complete"
    pub description: Option<String>,

    /// Custom labels added to the release record
    pub labels: BTreeMap<String, String>,

    /// Keep at most this many records per name
    pub max_history: Option<usize>,
}

impl InstallOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            wait: false,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            disable_hooks: false,
            dry_run: false,
            description: None,
            labels: BTreeMap::new(),
            max_history: None,
        }
    }

    /// Enable waiting for resources
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = timeout;
        self
    }

    pub fn without_hooks(mut self) -> Self {
        self.disable_hooks = true;
        self
    }

    /// Enable dry-run mode
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Options for upgrade
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Wait for resources to be ready
    pub wait: bool,

    pub timeout: Duration,

    pub disable_hooks: bool,

    /// Merge the supplied values over the deployed release's values
    pub reuse_values: bool,

    pub dry_run: bool,

    /// Description for this version
    pub description: Option<String>,

    pub labels: BTreeMap<String, String>,

    /// Maximum history to keep
    pub max_history: Option<usize>,
}

impl UpgradeOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            wait: false,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            disable_hooks: false,
            reuse_values: false,
            dry_run: false,
            description: None,
            labels: BTreeMap::new(),
            max_history: None,
        }
    }

    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = timeout;
        self
    }

    pub fn without_hooks(mut self) -> Self {
        self.disable_hooks = true;
        self
    }

    /// Reuse values from the deployed release
    pub fn reuse_values(mut self) -> Self {
        self.reuse_values = true;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = Some(max);
        self
    }
}

/// Options for rollback
#[derive(Debug, Clone)]
pub struct RollbackOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Target version (0 = previous)
    pub version: u32,

    pub wait: bool,

    pub timeout: Duration,

    pub disable_hooks: bool,

    pub dry_run: bool,

    /// Description recorded instead of "Rollback to N"
    pub description: Option<String>,

    pub max_history: Option<usize>,
}

impl RollbackOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: 0,
            wait: false,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            disable_hooks: false,
            dry_run: false,
            description: None,
            max_history: None,
        }
    }

    /// Roll back to a specific version instead of the previous one
    pub fn to_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn without_hooks(mut self) -> Self {
        self.disable_hooks = true;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Options for uninstall
#[derive(Debug, Clone)]
pub struct UninstallOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    pub timeout: Duration,

    /// Skip pre/post-delete hooks
    pub disable_hooks: bool,

    /// Leave the release's resources in the cluster
    pub keep: bool,

    pub dry_run: bool,

    /// Description recorded instead of "Uninstallation complete"
    pub description: Option<String>,
}

impl UninstallOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            disable_hooks: false,
            keep: false,
            dry_run: false,
            description: None,
        }
    }

    /// Keep resources in the cluster
    pub fn keep_resources(mut self) -> Self {
        self.keep = true;
        self
    }

    pub fn without_hooks(mut self) -> Self {
        self.disable_hooks = true;
        self
    }
}
