//! In-memory cluster for tests and offline runs
//!
//! Records every call, keeps applied objects in a map and lets tests inject
//! failures per (kind, name).

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::ClusterClient;
use crate::error::{KubeError, Result};
use crate::manifest::{Resource, ResourceKey, ResourceRef};

/// A recorded cluster call, carrying the resource display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Apply(String),
    Get(String),
    Delete(String),
    Wait(String),
}

impl ClusterCall {
    pub fn target(&self) -> &str {
        match self {
            Self::Apply(r) | Self::Get(r) | Self::Delete(r) | Self::Wait(r) => r,
        }
    }

    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Apply(_) | Self::Delete(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Apply,
    Delete,
    Wait,
}

#[derive(Default)]
struct State {
    objects: HashMap<ResourceKey, JsonValue>,
    calls: Vec<ClusterCall>,
    failures: HashSet<(Op, String, String)>,
}

/// [`ClusterClient`] that keeps objects in memory
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<State>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn inject(&self, op: Op, kind: &str, name: &str) {
        self.write()
            .failures
            .insert((op, kind.to_string(), name.to_string()));
    }

    /// Make every apply of `kind/name` fail
    pub fn fail_apply(&self, kind: &str, name: &str) {
        self.inject(Op::Apply, kind, name);
    }

    /// Make every delete of `kind/name` fail
    pub fn fail_delete(&self, kind: &str, name: &str) {
        self.inject(Op::Delete, kind, name);
    }

    /// Make waits on `kind/name` report a failed resource
    pub fn fail_wait(&self, kind: &str, name: &str) {
        self.inject(Op::Wait, kind, name);
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.write().failures.clear();
    }

    /// Put an object in place without recording a call
    pub fn insert(&self, resource: &Resource) {
        self.write()
            .objects
            .insert(resource.key(), resource.body.clone());
    }

    /// Drop an object without recording a call, as if deleted out of band
    pub fn remove(&self, resource: &ResourceRef) {
        self.write().objects.remove(&resource.key());
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.read()
            .objects
            .keys()
            .any(|k| k.kind == kind && k.name == name)
    }

    /// Live body of the first object matching `kind/name`
    pub fn object(&self, kind: &str, name: &str) -> Option<JsonValue> {
        self.read()
            .objects
            .iter()
            .find(|(k, _)| k.kind == kind && k.name == name)
            .map(|(_, v)| v.clone())
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.read().calls.clone()
    }

    /// Number of recorded calls touching `kind/name`
    pub fn calls_for(&self, kind: &str, name: &str) -> usize {
        let prefix = format!("{}/", kind);
        let suffix = format!("/{}", name);
        self.read()
            .calls
            .iter()
            .filter(|c| c.target().starts_with(&prefix) && c.target().ends_with(&suffix))
            .count()
    }

    fn should_fail(state: &State, op: Op, resource: &ResourceRef) -> bool {
        state
            .failures
            .contains(&(op, resource.kind.clone(), resource.name.clone()))
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn apply(&self, resource: &Resource) -> Result<()> {
        let reference = resource.reference();
        let mut state = self.write();
        state.calls.push(ClusterCall::Apply(reference.to_string()));

        if Self::should_fail(&state, Op::Apply, &reference) {
            return Err(KubeError::Storage(format!(
                "injected apply failure for {}",
                reference
            )));
        }
        state.objects.insert(reference.key(), resource.body.clone());
        Ok(())
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<JsonValue>> {
        let mut state = self.write();
        state.calls.push(ClusterCall::Get(resource.to_string()));
        Ok(state.objects.get(&resource.key()).cloned())
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        let mut state = self.write();
        state.calls.push(ClusterCall::Delete(resource.to_string()));

        if Self::should_fail(&state, Op::Delete, resource) {
            return Err(KubeError::Storage(format!(
                "injected delete failure for {}",
                resource
            )));
        }
        Ok(state.objects.remove(&resource.key()).is_some())
    }

    async fn wait_ready(&self, resource: &ResourceRef, _timeout: Duration) -> Result<()> {
        let mut state = self.write();
        state.calls.push(ClusterCall::Wait(resource.to_string()));

        if Self::should_fail(&state, Op::Wait, resource) {
            return Err(KubeError::NotReady {
                resource: resource.to_string(),
                reason: "injected wait failure".to_string(),
            });
        }
        if !state.objects.contains_key(&resource.key()) {
            return Err(KubeError::NotReady {
                resource: resource.to_string(),
                reason: "deleted before it became ready".to_string(),
            });
        }
        Ok(())
    }
}
