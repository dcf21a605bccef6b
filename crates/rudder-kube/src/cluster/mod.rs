//! The four operations the lifecycle needs from a cluster

mod kubernetes;
mod mock;

pub use self::kubernetes::KubeCluster;
pub use self::mock::{ClusterCall, MockCluster};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::manifest::{Resource, ResourceRef};

/// Cluster access used by the hook executor and the diff/apply engine
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create or update an object (server-side apply)
    async fn apply(&self, resource: &Resource) -> Result<()>;

    /// Fetch the live object, `None` if it does not exist
    async fn get(&self, resource: &ResourceRef) -> Result<Option<serde_json::Value>>;

    /// Delete an object; `false` if it was already gone
    async fn delete(&self, resource: &ResourceRef) -> Result<bool>;

    /// Wait until the object is ready, or a Job has completed
    ///
    /// Implementations return `KubeError::Timeout` when `timeout` elapses.
    async fn wait_ready(&self, resource: &ResourceRef, timeout: Duration) -> Result<()>;
}

#[async_trait]
impl<T: ClusterClient + ?Sized> ClusterClient for std::sync::Arc<T> {
    async fn apply(&self, resource: &Resource) -> Result<()> {
        (**self).apply(resource).await
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<serde_json::Value>> {
        (**self).get(resource).await
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        (**self).delete(resource).await
    }

    async fn wait_ready(&self, resource: &ResourceRef, timeout: Duration) -> Result<()> {
        (**self).wait_ready(resource, timeout).await
    }
}
