//! Kubernetes Secrets storage driver
//!
//! The default driver. Each release version is one Secret named after
//! [`Release::storage_key`], of type `rudder.io/release.v1`, whose `release`
//! key holds base64 of the compressed JSON record. Labels carry name, version
//! and status so history queries are a single label-selected list.

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use std::collections::BTreeMap;
use tracing::warn;

use super::{StorageConfig, StorageDriver, decode_from_storage, encode_for_storage, storage_labels};
use crate::error::{KubeError, Result};
use crate::release::{Release, storage_key};

const SECRET_TYPE: &str = "rudder.io/release.v1";
const RELEASE_KEY: &str = "release";
const MANAGED_BY: &str = "app.kubernetes.io/managed-by=rudder";

/// Kubernetes Secrets storage driver
pub struct SecretsDriver {
    client: Client,
    config: StorageConfig,
}

impl SecretsDriver {
    /// Create a driver using the default kubeconfig
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client, config })
    }

    /// Create with an existing client
    pub fn with_client(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    fn secrets_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn parse_secret(secret: &Secret) -> Result<Release> {
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(RELEASE_KEY))
            .ok_or_else(|| KubeError::Storage("Secret missing 'release' data".to_string()))?;

        let encoded = std::str::from_utf8(&data.0)
            .map_err(|e| KubeError::Storage(format!("Invalid UTF-8 in secret: {}", e)))?;
        decode_from_storage(encoded)
    }

    fn parse_all(secrets: &[Secret]) -> Vec<Release> {
        secrets
            .iter()
            .filter_map(|secret| match Self::parse_secret(secret) {
                Ok(release) => Some(release),
                Err(e) => {
                    warn!(
                        secret = secret.metadata.name.as_deref().unwrap_or("unnamed"),
                        error = %e,
                        "skipping unreadable release secret"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Secret holding one release version
fn build_secret(release: &Release, config: &StorageConfig) -> Result<Secret> {
    let mut labels = storage_labels(release);
    labels.insert(
        "rudder.io/compression".to_string(),
        config.compression.label().to_string(),
    );

    let encoded = encode_for_storage(release, config)?;
    let mut data = BTreeMap::new();
    data.insert(RELEASE_KEY.to_string(), ByteString(encoded.into_bytes()));

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(release.storage_key()),
            namespace: Some(release.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    })
}

#[async_trait]
impl StorageDriver for SecretsDriver {
    fn name(&self) -> &'static str {
        "secrets"
    }

    async fn create(&self, release: &Release) -> Result<()> {
        let secret = build_secret(release, &self.config)?;
        match self
            .secrets_api(&release.namespace)
            .create(&PostParams::default(), &secret)
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "already exists",
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let api = self.secrets_api(&release.namespace);
        let key = release.storage_key();

        let existing = api.get_opt(&key).await?.ok_or_else(|| KubeError::StoreConflict {
            name: release.name.clone(),
            version: release.version,
            reason: "does not exist",
        })?;

        let mut secret = build_secret(release, &self.config)?;
        secret.metadata.resource_version = existing.metadata.resource_version;

        match api.replace(&key, &PostParams::default(), &secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "does not exist",
            }),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "was modified concurrently",
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        match self
            .secrets_api(namespace)
            .get_opt(&storage_key(name, version))
            .await?
        {
            Some(secret) => Self::parse_secret(&secret),
            None => Err(KubeError::version_not_found(name, version)),
        }
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        let selector = format!("{},rudder.io/release-name={}", MANAGED_BY, name);
        let secrets = self
            .secrets_api(namespace)
            .list(&ListParams::default().labels(&selector))
            .await?;

        let mut releases = Self::parse_all(&secrets.items);
        releases.sort_by_key(|r| r.version);
        Ok(releases)
    }

    async fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Release>> {
        let lp = ListParams::default().labels(MANAGED_BY);
        let secrets = match namespace {
            Some(ns) => self.secrets_api(ns).list(&lp).await?,
            None => Api::<Secret>::all(self.client.clone()).list(&lp).await?,
        };
        Ok(Self::parse_all(&secrets.items))
    }

    async fn delete(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        let release = self.get(namespace, name, version).await?;
        match self
            .secrets_api(namespace)
            .delete(&release.storage_key(), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(release),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                Err(KubeError::version_not_found(name, version))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Status;
    use crate::storage::CompressionMethod;
    use rudder_core::{ChartMetadata, Values};

    fn release() -> Release {
        let mut r = Release::new(
            "web",
            "prod",
            4,
            ChartMetadata::new("demo", semver::Version::new(1, 2, 0)),
            Values::from_yaml("replicas: 2").unwrap(),
            Status::Deployed,
            "Upgrade complete",
        );
        r.manifest = "---\n# Source: cm.yaml\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n".to_string();
        r
    }

    #[test]
    fn test_build_secret_metadata() {
        let secret = build_secret(&release(), &StorageConfig::default()).unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("sh.rudder.release.v1.web.v4"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("prod"));
        assert_eq!(secret.type_.as_deref(), Some(SECRET_TYPE));

        let labels = secret.metadata.labels.unwrap();
        assert_eq!(labels["rudder.io/release-status"], "deployed");
        assert_eq!(labels["rudder.io/compression"], "zstd");
    }

    #[test]
    fn test_secret_roundtrip() {
        let rel = release();
        for compression in [CompressionMethod::None, CompressionMethod::Gzip { level: 6 }] {
            let secret = build_secret(&rel, &StorageConfig { compression }).unwrap();
            assert_eq!(SecretsDriver::parse_secret(&secret).unwrap(), rel);
        }
    }

    #[test]
    fn test_parse_secret_without_payload() {
        let secret = Secret::default();
        assert!(matches!(
            SecretsDriver::parse_secret(&secret),
            Err(KubeError::Storage(_))
        ));
        assert!(SecretsDriver::parse_all(&[secret]).is_empty());
    }
}
