//! Storage drivers for persisting release records
//!
//! Rudder supports several backends:
//! - **Secrets** (default): one Kubernetes Secret per release version
//! - **File**: compressed JSON files under a local directory
//! - **Memory**: process-local, for tests and dry runs
//!
//! Records are keyed by (namespace, name, version). `create` never overwrites
//! and `update` never creates, so a racing writer surfaces as `StoreConflict`.

mod file;
mod memory;
mod secrets;

pub use file::FileDriver;
pub use memory::{MemoryDriver, OperationCounts};
pub use secrets::SecretsDriver;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use crate::error::{KubeError, Result};
use crate::release::{Release, Status};

/// Storage driver trait for release persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Short driver name for logs and status output
    fn name(&self) -> &'static str;

    /// Store a new record; `StoreConflict` if the version already exists
    async fn create(&self, release: &Release) -> Result<()>;

    /// Replace an existing record; `StoreConflict` if it does not exist
    async fn update(&self, release: &Release) -> Result<()>;

    /// A specific version; `NotFound` if absent
    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<Release>;

    /// All versions of a name, ascending; empty when the name is unknown
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>>;

    /// Every record, optionally restricted to one namespace
    async fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Release>>;

    /// Remove a version, returning it; used for history pruning only
    async fn delete(&self, namespace: &str, name: &str, version: u32) -> Result<Release>;

    /// Highest version regardless of status
    async fn last(&self, namespace: &str, name: &str) -> Result<Release> {
        self.history(namespace, name)
            .await?
            .pop()
            .ok_or_else(|| KubeError::release_not_found(name))
    }

    /// The unique deployed version
    async fn deployed(&self, namespace: &str, name: &str) -> Result<Release> {
        let mut deployed: Vec<Release> = self
            .history(namespace, name)
            .await?
            .into_iter()
            .filter(|r| r.info.status == Status::Deployed)
            .collect();

        match deployed.len() {
            0 => Err(KubeError::NotFound {
                what: format!("deployed release '{}'", name),
            }),
            1 => Ok(deployed.remove(0)),
            _ => Err(KubeError::MultipleDeployed {
                name: name.to_string(),
                versions: deployed.iter().map(|r| r.version).collect(),
            }),
        }
    }

    /// Latest record per release name
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Release>> {
        Ok(latest_per_name(self.list_all(namespace).await?))
    }
}

#[async_trait]
impl<T: StorageDriver + ?Sized> StorageDriver for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn create(&self, release: &Release) -> Result<()> {
        (**self).create(release).await
    }

    async fn update(&self, release: &Release) -> Result<()> {
        (**self).update(release).await
    }

    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        (**self).get(namespace, name, version).await
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        (**self).history(namespace, name).await
    }

    async fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Release>> {
        (**self).list_all(namespace).await
    }

    async fn delete(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        (**self).delete(namespace, name, version).await
    }
}

/// Keep the highest version of each (namespace, name), sorted by namespace then name
pub fn latest_per_name(records: Vec<Release>) -> Vec<Release> {
    let mut latest: HashMap<(String, String), Release> = HashMap::new();
    for release in records {
        let key = (release.namespace.clone(), release.name.clone());
        match latest.get(&key) {
            Some(existing) if existing.version >= release.version => {}
            _ => {
                latest.insert(key, release);
            }
        }
    }
    let mut out: Vec<Release> = latest.into_values().collect();
    out.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    out
}

/// Storage configuration
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Compression method
    pub compression: CompressionMethod,
}

/// Compression method for release data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    None,

    /// Gzip compression (Helm-compatible)
    Gzip { level: u32 },

    /// Zstd compression (better ratio, faster)
    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

impl CompressionMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip { .. } => "gzip",
            Self::Zstd { .. } => "zstd",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "none" => Some(Self::None),
            "gzip" => Some(Self::Gzip { level: 6 }),
            "zstd" => Some(Self::Zstd { level: 3 }),
            _ => None,
        }
    }

    /// Guess the method from the payload's magic bytes
    pub fn detect(data: &[u8]) -> Self {
        match data {
            [0x28, 0xb5, 0x2f, 0xfd, ..] => Self::Zstd { level: 3 },
            [0x1f, 0x8b, ..] => Self::Gzip { level: 6 },
            _ => Self::None,
        }
    }
}

/// Compress data using the configured method
#[must_use = "compression result should be used"]
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { level } => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| KubeError::Compression(e.to_string()))
        }
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Decompress data
#[must_use = "decompression result should be used"]
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { .. } => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            Ok(decompressed)
        }
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Serialize and compress a release
pub fn encode_release(release: &Release, compression: CompressionMethod) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(release)?;
    compress(&json, compression)
}

/// Decompress (method detected from the payload) and deserialize a release
pub fn decode_release(data: &[u8]) -> Result<Release> {
    let json = decompress(data, CompressionMethod::detect(data))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Encode for a Secret payload (serialize + compress + base64)
#[must_use = "encoded data should be used for storage"]
pub fn encode_for_storage(release: &Release, config: &StorageConfig) -> Result<String> {
    let compressed = encode_release(release, config.compression)?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        &compressed,
    ))
}

/// Decode a Secret payload (base64 + decompress + deserialize)
#[must_use = "decoded release should be used"]
pub fn decode_from_storage(data: &str) -> Result<Release> {
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data.trim())
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {}", e)))?;
    decode_release(&decoded)
}

/// Labels applied to all storage objects
#[must_use = "labels should be applied to resources"]
pub fn storage_labels(release: &Release) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/managed-by".to_string(), "rudder".to_string());
    labels.insert("rudder.io/release-name".to_string(), release.name.clone());
    labels.insert("rudder.io/release-version".to_string(), release.version.to_string());
    labels.insert("rudder.io/release-status".to_string(), release.info.status.to_string());
    labels
}
