//! Cluster access through kube-rs
//!
//! Resources are handled as `DynamicObject`s resolved through API discovery,
//! so no compile-time knowledge of kinds is needed. Writes use Server-Side
//! Apply with the `rudder` field manager.

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PropagationPolicy},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use super::ClusterClient;
use crate::error::{KubeError, Result};
use crate::manifest::{Resource, ResourceRef};

/// Field manager name for Server-Side Apply
const FIELD_MANAGER: &str = "rudder";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

struct Connection {
    client: Client,
    discovery: RwLock<Discovery>,
}

/// [`ClusterClient`] backed by a Kubernetes API server
///
/// The connection is opened on first use, so commands that only read the
/// release store never need a reachable cluster.
pub struct KubeCluster {
    client: Option<Client>,
    connection: OnceCell<Connection>,
}

impl Default for KubeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl KubeCluster {
    /// Use the default kubeconfig / in-cluster configuration
    pub fn new() -> Self {
        Self {
            client: None,
            connection: OnceCell::new(),
        }
    }

    /// Use an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client: Some(client),
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<&Connection> {
        self.connection
            .get_or_try_init(|| async {
                let client = match &self.client {
                    Some(client) => client.clone(),
                    None => Client::try_default().await?,
                };
                let discovery = Discovery::new(client.clone()).run().await?;
                Ok::<_, KubeError>(Connection {
                    client,
                    discovery: RwLock::new(discovery),
                })
            })
            .await
    }

    /// Resolve a reference to its API resource, refreshing discovery once
    /// when the kind is unknown (e.g. a CRD applied moments ago)
    async fn resolve(&self, resource: &ResourceRef) -> Result<(ApiResource, ApiCapabilities)> {
        let conn = self.connection().await?;
        let gvk = gvk_of(resource);

        if let Some(found) = conn.discovery.read().await.resolve_gvk(&gvk) {
            return Ok(found);
        }

        debug!(kind = %resource.kind, api_version = %resource.api_version, "refreshing API discovery");
        let refreshed = Discovery::new(conn.client.clone()).run().await?;
        let mut discovery = conn.discovery.write().await;
        *discovery = refreshed;

        discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type {}/{}",
                resource.api_version, resource.kind
            ))
        })
    }

    async fn api(&self, resource: &ResourceRef) -> Result<Api<DynamicObject>> {
        let (api_resource, capabilities) = self.resolve(resource).await?;
        let client = self.connection().await?.client.clone();

        Ok(if capabilities.scope == Scope::Namespaced {
            let ns = resource.namespace.as_deref().unwrap_or("default");
            Api::namespaced_with(client, ns, &api_resource)
        } else {
            Api::all_with(client, &api_resource)
        })
    }

    async fn poll_ready(&self, resource: &ResourceRef) -> Result<()> {
        let api = self.api(resource).await?;

        loop {
            let live = api.get_opt(&resource.name).await?;
            let Some(obj) = live else {
                return Err(KubeError::NotReady {
                    resource: resource.to_string(),
                    reason: "deleted before it became ready".to_string(),
                });
            };

            match readiness(&resource.kind, &serde_json::to_value(&obj)?) {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(reason) => {
                    return Err(KubeError::NotReady {
                        resource: resource.to_string(),
                        reason,
                    });
                }
                Readiness::Pending => {
                    debug!(resource = %resource, "waiting for readiness");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn apply(&self, resource: &Resource) -> Result<()> {
        let reference = resource.reference();
        let api = self.api(&reference).await?;
        let obj: DynamicObject = serde_json::from_value(resource.body.clone())?;

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        api.patch(&resource.name, &params, &Patch::Apply(&obj))
            .await?;
        debug!(resource = %reference, "applied");
        Ok(())
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<JsonValue>> {
        let api = self.api(resource).await?;
        match api.get_opt(&resource.name).await? {
            Some(obj) => Ok(Some(serde_json::to_value(obj)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        let api = self.api(resource).await?;
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(&resource.name, &params).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    async fn wait_ready(&self, resource: &ResourceRef, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.poll_ready(resource))
            .await
            .map_err(|_| {
                KubeError::Timeout(format!("{:?} waiting for {}", timeout, resource))
            })?
    }
}

/// Convert apiVersion/kind to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_of(resource: &ResourceRef) -> GroupVersionKind {
    let (group, version) = match resource.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), resource.api_version.clone()),
    };
    GroupVersionKind {
        group,
        version,
        kind: resource.kind.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Ready,
    Pending,
    Failed(String),
}

/// Readiness of a live object, judged from its status
fn readiness(kind: &str, obj: &JsonValue) -> Readiness {
    let status = &obj["status"];
    let int = |v: &JsonValue| v.as_i64().unwrap_or(0);

    match kind {
        "Job" => {
            if int(&status["succeeded"]) > 0 {
                Readiness::Ready
            } else if let Some(reason) = true_condition(status, "Failed") {
                Readiness::Failed(reason)
            } else {
                Readiness::Pending
            }
        }
        "Deployment" => {
            let desired = obj["spec"]["replicas"].as_i64().unwrap_or(1);
            let generation = int(&obj["metadata"]["generation"]);
            let observed = int(&status["observedGeneration"]);
            if observed >= generation
                && int(&status["updatedReplicas"]) >= desired
                && int(&status["availableReplicas"]) >= desired
            {
                Readiness::Ready
            } else {
                Readiness::Pending
            }
        }
        "StatefulSet" => {
            let desired = obj["spec"]["replicas"].as_i64().unwrap_or(1);
            if int(&status["readyReplicas"]) >= desired {
                Readiness::Ready
            } else {
                Readiness::Pending
            }
        }
        "DaemonSet" => {
            if int(&status["numberReady"]) >= int(&status["desiredNumberScheduled"]) {
                Readiness::Ready
            } else {
                Readiness::Pending
            }
        }
        "Pod" => match status["phase"].as_str() {
            Some("Succeeded") => Readiness::Ready,
            Some("Failed") => Readiness::Failed(
                status["message"]
                    .as_str()
                    .unwrap_or("pod failed")
                    .to_string(),
            ),
            Some("Running") if true_condition(status, "Ready").is_some() => Readiness::Ready,
            _ => Readiness::Pending,
        },
        "PersistentVolumeClaim" => {
            if status["phase"].as_str() == Some("Bound") {
                Readiness::Ready
            } else {
                Readiness::Pending
            }
        }
        "CustomResourceDefinition" => {
            if true_condition(status, "Established").is_some() {
                Readiness::Ready
            } else {
                Readiness::Pending
            }
        }
        _ => Readiness::Ready,
    }
}

/// Message of a condition of the given type whose status is "True"
fn true_condition(status: &JsonValue, kind: &str) -> Option<String> {
    status["conditions"].as_array()?.iter().find_map(|c| {
        (c["type"].as_str() == Some(kind) && c["status"].as_str() == Some("True")).then(|| {
            c["message"]
                .as_str()
                .or_else(|| c["reason"].as_str())
                .unwrap_or(kind)
                .to_string()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gvk_of() {
        let r = ResourceRef {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "web".to_string(),
            namespace: Some("default".to_string()),
        };
        let gvk = gvk_of(&r);
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");

        let core = ResourceRef {
            api_version: "v1".to_string(),
            ..r
        };
        assert_eq!(gvk_of(&core).group, "");
    }

    #[test]
    fn test_job_readiness() {
        assert_eq!(
            readiness("Job", &json!({"status": {"succeeded": 1}})),
            Readiness::Ready
        );
        assert_eq!(
            readiness("Job", &json!({"status": {"active": 1}})),
            Readiness::Pending
        );
        assert_eq!(
            readiness(
                "Job",
                &json!({"status": {"conditions": [
                    {"type": "Failed", "status": "True", "reason": "BackoffLimitExceeded"}
                ]}})
            ),
            Readiness::Failed("BackoffLimitExceeded".to_string())
        );
    }

    #[test]
    fn test_deployment_readiness() {
        let rolling = json!({
            "metadata": {"generation": 2},
            "spec": {"replicas": 3},
            "status": {"observedGeneration": 2, "updatedReplicas": 3, "availableReplicas": 2}
        });
        assert_eq!(readiness("Deployment", &rolling), Readiness::Pending);

        let done = json!({
            "metadata": {"generation": 2},
            "spec": {"replicas": 3},
            "status": {"observedGeneration": 2, "updatedReplicas": 3, "availableReplicas": 3}
        });
        assert_eq!(readiness("Deployment", &done), Readiness::Ready);
    }

    #[test]
    fn test_pod_and_crd_readiness() {
        let running = json!({"status": {"phase": "Running", "conditions": [
            {"type": "Ready", "status": "True"}
        ]}});
        assert_eq!(readiness("Pod", &running), Readiness::Ready);
        assert!(matches!(
            readiness("Pod", &json!({"status": {"phase": "Failed"}})),
            Readiness::Failed(_)
        ));

        let crd = json!({"status": {"conditions": [
            {"type": "Established", "status": "True"}
        ]}});
        assert_eq!(readiness("CustomResourceDefinition", &crd), Readiness::Ready);
        assert_eq!(readiness("ConfigMap", &json!({})), Readiness::Ready);
    }
}
