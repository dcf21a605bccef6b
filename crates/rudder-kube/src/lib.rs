//! Rudder Kube - the release lifecycle
//!
//! This crate provides:
//! - **Release model**: versioned release records and their status machine
//! - **Storage drivers**: persist release history in memory, local files or Secrets
//! - **Hooks**: ordered lifecycle hooks with delete policies and timeouts
//! - **Diff/Apply**: reconcile a previous manifest set against a new one
//! - **Cluster contract**: the four operations the lifecycle needs from Kubernetes
//! - **ReleaseManager**: install, upgrade, rollback and uninstall transitions

pub mod actions;
pub mod cluster;
pub mod controller;
pub mod diff;
pub mod error;
pub mod hooks;
pub mod manifest;
pub mod release;
pub mod render;
pub mod storage;

pub use actions::{InstallOptions, RollbackOptions, UninstallOptions, UpgradeOptions};
pub use cluster::{ClusterCall, ClusterClient, KubeCluster, MockCluster};
pub use controller::{ListFilter, ReleaseManager};
pub use diff::{ActionPlan, ApplyReport, ChangeType, ReleaseDiff, ResourceChange};
pub use error::{KubeError, Result};
pub use hooks::{DeletePolicy, Hook, HookEvent, HookExecutor, HookPhase, HookRun};
pub use manifest::{Resource, ResourceKey, ResourceRef};
pub use release::{DeployInfo, Release, Status};
pub use render::Renderer;
pub use storage::{
    CompressionMethod, FileDriver, MemoryDriver, OperationCounts, SecretsDriver, StorageConfig,
    StorageDriver,
};
