//! Error types for rudder-kube

use thiserror::Error;

use crate::release::Release;

/// Result type for rudder-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while managing releases
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Release or release version does not exist
    #[error("{what} not found")]
    NotFound { what: String },

    /// The requested transition is not allowed from the current state
    #[error("cannot {action} release '{name}': {reason}")]
    InvalidState {
        name: String,
        action: &'static str,
        reason: String,
    },

    /// Another operation left the release in a pending state
    #[error("another operation is in progress for release '{name}' ({status})\nHint: Run `rudder recover {name}` if the operation is stuck")]
    OperationInProgress { name: String, status: String },

    /// More than one version is marked deployed
    #[error("release '{name}' has {} deployed versions {versions:?}; history is inconsistent", .versions.len())]
    MultipleDeployed { name: String, versions: Vec<u32> },

    /// A hook failed or timed out; the rest of its batch was skipped
    #[error("hook '{hook}' failed during {event}: {message}")]
    HookFailure {
        hook: String,
        event: String,
        message: String,
    },

    /// One or more resource operations failed
    #[error("{} resource operation(s) failed: {}", .failures.len(), join_failures(.failures))]
    ApplyFailure {
        failures: Vec<ResourceFailure>,
        /// Operations that did succeed before and after the failures
        succeeded: usize,
    },

    /// Create of an existing key or update of a missing one
    #[error("release '{name}' version {version} {reason}")]
    StoreConflict {
        name: String,
        version: u32,
        reason: &'static str,
    },

    /// A transition failed after its release record was written
    #[error("release '{}' version {} failed: {source}", .release.name, .release.version)]
    Transition {
        release: Box<Release>,
        #[source]
        source: Box<KubeError>,
    },

    /// A resource reached a terminal failure while waiting for it
    #[error("{resource} failed: {reason}")]
    NotReady { resource: String, reason: String },

    #[error("render error: {0}")]
    Render(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("operation timed out after {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single resource operation that failed during apply or delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    /// `Kind/namespace/name`
    pub resource: String,
    pub action: &'static str,
    pub message: String,
}

impl std::fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.action, self.resource, self.message)
    }
}

fn join_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<rudder_engine::EngineError> for KubeError {
    fn from(e: rudder_engine::EngineError) -> Self {
        KubeError::Render(e.to_string())
    }
}

impl From<rudder_core::CoreError> for KubeError {
    fn from(e: rudder_core::CoreError) -> Self {
        KubeError::Render(e.to_string())
    }
}

impl KubeError {
    pub fn release_not_found(name: &str) -> Self {
        KubeError::NotFound {
            what: format!("release '{}'", name),
        }
    }

    pub fn version_not_found(name: &str, version: u32) -> Self {
        KubeError::NotFound {
            what: format!("release '{}' version {}", name, version),
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// The underlying error, looking through a failed transition
    pub fn root(&self) -> &KubeError {
        match self {
            KubeError::Transition { source, .. } => source.root(),
            other => other,
        }
    }

    /// Release record left behind by a failed transition
    pub fn release(&self) -> Option<&Release> {
        match self {
            KubeError::Transition { release, .. } => Some(release),
            _ => None,
        }
    }
}
