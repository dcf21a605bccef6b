//! In-memory storage driver
//!
//! Stores releases in process memory. Used by tests and dry runs; clones
//! share the same store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use super::StorageDriver;
use crate::error::{KubeError, Result};
use crate::release::Release;

type Store = HashMap<(String, String), BTreeMap<u32, Release>>;

/// In-memory storage driver
#[derive(Clone, Default)]
pub struct MemoryDriver {
    /// (namespace, name) -> version -> release
    store: Arc<RwLock<Store>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed, for test assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    /// Writes of any kind
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<Release>) -> Self {
        let driver = Self::new();
        {
            let mut store = driver.write_store();
            for release in releases {
                store
                    .entry((release.namespace.clone(), release.name.clone()))
                    .or_default()
                    .insert(release.version, release);
            }
        }
        driver
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset_counts(&self) {
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    /// Count total records
    pub fn release_count(&self) -> usize {
        self.read_store().values().map(BTreeMap::len).sum()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner));
    }

    fn read_store(&self) -> std::sync::RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> std::sync::RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, release: &Release) -> Result<()> {
        self.count(|c| c.creates += 1);
        let mut store = self.write_store();
        let versions = store
            .entry((release.namespace.clone(), release.name.clone()))
            .or_default();

        if versions.contains_key(&release.version) {
            return Err(KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "already exists",
            });
        }
        versions.insert(release.version, release.clone());
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        self.count(|c| c.updates += 1);
        let mut store = self.write_store();
        let slot = store
            .get_mut(&(release.namespace.clone(), release.name.clone()))
            .and_then(|versions| versions.get_mut(&release.version))
            .ok_or_else(|| KubeError::StoreConflict {
                name: release.name.clone(),
                version: release.version,
                reason: "does not exist",
            })?;
        *slot = release.clone();
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        self.count(|c| c.gets += 1);
        self.read_store()
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| KubeError::version_not_found(name, version))
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        self.count(|c| c.lists += 1);
        Ok(self
            .read_store()
            .get(&(namespace.to_string(), name.to_string()))
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_all(&self, namespace: Option<&str>) -> Result<Vec<Release>> {
        self.count(|c| c.lists += 1);
        Ok(self
            .read_store()
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|n| n == ns.as_str()))
            .flat_map(|(_, versions)| versions.values().cloned())
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str, version: u32) -> Result<Release> {
        self.count(|c| c.deletes += 1);
        let mut store = self.write_store();
        let key = (namespace.to_string(), name.to_string());
        let removed = store
            .get_mut(&key)
            .and_then(|versions| versions.remove(&version))
            .ok_or_else(|| KubeError::version_not_found(name, version))?;

        if store.get(&key).is_some_and(BTreeMap::is_empty) {
            store.remove(&key);
        }
        Ok(removed)
    }
}
