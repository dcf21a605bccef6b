//! Diff/apply engine
//!
//! [`ActionPlan`] reconciles the previous manifest set against the new one;
//! [`apply_plan`] executes it against a cluster, collecting every outcome
//! instead of stopping at the first error. [`diff_releases`] produces a
//! readable text diff between two stored releases.

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::error::{KubeError, ResourceFailure, Result};
use crate::manifest::{self, Resource, ResourceKey, ResourceRef};
use crate::release::Release;

/// Creates, updates and deletes needed to move from one manifest set to another
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub create: Vec<Resource>,
    pub update: Vec<Resource>,
    pub delete: Vec<Resource>,
}

impl ActionPlan {
    /// Resources are matched by (group, kind, namespace, name)
    pub fn compute(old: &[Resource], new: &[Resource]) -> Self {
        let old_keys: HashSet<ResourceKey> = old.iter().map(Resource::key).collect();
        let new_keys: HashSet<ResourceKey> = new.iter().map(Resource::key).collect();

        let mut plan = Self::default();
        for resource in new {
            if old_keys.contains(&resource.key()) {
                plan.update.push(resource.clone());
            } else {
                plan.create.push(resource.clone());
            }
        }
        plan.delete = old
            .iter()
            .filter(|r| !new_keys.contains(&r.key()))
            .cloned()
            .collect();
        plan
    }

    /// Delete everything, as for uninstall
    pub fn deletion(resources: Vec<Resource>) -> Self {
        Self {
            delete: resources,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    /// Update whose live object had vanished
    Recreate,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Recreate => "recreate",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Deleted,
    Skipped(String),
    Failed(String),
}

/// Outcome of one resource operation
#[derive(Debug, Clone)]
pub struct ResourceResult {
    pub resource: ResourceRef,
    pub action: Action,
    pub outcome: Outcome,
}

/// Per-resource outcomes of an [`ActionPlan`]
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub results: Vec<ResourceResult>,
}

impl ApplyReport {
    /// At least one mutating cluster call succeeded
    pub fn crossed_threshold(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.outcome, Outcome::Applied | Outcome::Deleted))
    }

    pub fn failures(&self) -> Vec<ResourceFailure> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Failed(message) => Some(ResourceFailure {
                    resource: r.resource.to_string(),
                    action: r.action.as_str(),
                    message: message.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Applied | Outcome::Deleted))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&ResourceRef, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Skipped(reason) => Some((&r.resource, reason.as_str())),
            _ => None,
        })
    }

    /// `ApplyFailure` when any operation failed
    pub fn into_result(self) -> Result<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(KubeError::ApplyFailure {
                failures,
                succeeded: self.succeeded(),
            })
        }
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let failed = self.failures().len();
        let skipped = self.skipped().count();
        let mut parts = Vec::with_capacity(3);
        parts.push(format!("{} succeeded", self.succeeded()));
        if failed > 0 {
            parts.push(format!("{} failed", failed));
        }
        if skipped > 0 {
            parts.push(format!("{} skipped", skipped));
        }
        parts.join(", ")
    }

    fn record(&mut self, resource: ResourceRef, action: Action, outcome: Outcome) {
        self.results.push(ResourceResult {
            resource,
            action,
            outcome,
        });
    }
}

/// Execute a plan: creates and updates in install order, then deletes in
/// reverse install order
///
/// Never stops early; every failure ends up in the report.
pub async fn apply_plan<C: ClusterClient + ?Sized>(cluster: &C, plan: &ActionPlan) -> ApplyReport {
    let mut report = ApplyReport::default();

    let mut upserts: Vec<(Resource, Action)> = plan
        .create
        .iter()
        .map(|r| (r.clone(), Action::Create))
        .chain(plan.update.iter().map(|r| (r.clone(), Action::Update)))
        .collect();
    upserts.sort_by(|(a, _), (b, _)| {
        (a.install_order(), &a.kind, &a.namespace, &a.name).cmp(&(
            b.install_order(),
            &b.kind,
            &b.namespace,
            &b.name,
        ))
    });

    for (resource, mut action) in upserts {
        let reference = resource.reference();

        if action == Action::Update {
            match cluster.get(&reference).await {
                Ok(None) => {
                    debug!(resource = %reference, "live object missing, recreating");
                    action = Action::Recreate;
                }
                Ok(Some(_)) => {}
                Err(e) => warn!(resource = %reference, error = %e, "live lookup failed"),
            }
        }

        let outcome = match cluster.apply(&resource).await {
            Ok(()) => Outcome::Applied,
            Err(e) => {
                warn!(resource = %reference, action = action.as_str(), error = %e, "apply failed");
                Outcome::Failed(e.to_string())
            }
        };
        report.record(reference, action, outcome);
    }

    let mut deletes = plan.delete.clone();
    manifest::sort_for_delete(&mut deletes);

    for resource in deletes {
        let reference = resource.reference();

        if resource.has_keep_policy() {
            report.record(
                reference,
                Action::Delete,
                Outcome::Skipped("resource-policy: keep".to_string()),
            );
            continue;
        }

        match cluster.get(&reference).await {
            Ok(None) => {
                report.record(
                    reference,
                    Action::Delete,
                    Outcome::Skipped("not found".to_string()),
                );
                continue;
            }
            Ok(Some(_)) => {}
            Err(e) => warn!(resource = %reference, error = %e, "live lookup failed"),
        }

        let outcome = match cluster.delete(&reference).await {
            Ok(true) => Outcome::Deleted,
            Ok(false) => Outcome::Skipped("not found".to_string()),
            Err(e) if e.is_not_found() => Outcome::Skipped("not found".to_string()),
            Err(e) => {
                warn!(resource = %reference, error = %e, "delete failed");
                Outcome::Failed(e.to_string())
            }
        };
        report.record(reference, Action::Delete, outcome);
    }

    report
}

/// Type of change to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// A resource that differs between two releases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub change_type: ChangeType,
    /// Unified diff of the rendered documents
    pub diff: String,
}

impl ResourceChange {
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.kind, ns, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Differences between two releases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDiff {
    pub from: u32,
    pub to: u32,
    pub changes: Vec<ResourceChange>,
}

impl ReleaseDiff {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn count(&self, change_type: ChangeType) -> usize {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .count()
    }

    pub fn summary(&self) -> String {
        if !self.has_changes() {
            return "No changes".to_string();
        }
        let mut parts = Vec::new();
        for (t, label) in [
            (ChangeType::Added, "added"),
            (ChangeType::Modified, "modified"),
            (ChangeType::Removed, "removed"),
        ] {
            let n = self.count(t);
            if n > 0 {
                parts.push(format!("{} {}", n, label));
            }
        }
        parts.join(", ")
    }
}

/// Compare the manifests of two releases
pub fn diff_releases(old: &Release, new: &Release) -> Result<ReleaseDiff> {
    let by_key = |release: &Release| -> Result<BTreeMap<ResourceKey, Resource>> {
        Ok(manifest::parse_manifest(&release.manifest, &release.namespace)?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect())
    };
    let old_resources = by_key(old)?;
    let new_resources = by_key(new)?;

    let mut changes = Vec::new();
    for (key, new_res) in &new_resources {
        match old_resources.get(key) {
            Some(old_res) if old_res.body == new_res.body => {}
            Some(old_res) => changes.push(change(
                new_res,
                ChangeType::Modified,
                &old_res.source,
                &new_res.source,
            )),
            None => changes.push(change(new_res, ChangeType::Added, "", &new_res.source)),
        }
    }
    for (key, old_res) in &old_resources {
        if !new_resources.contains_key(key) {
            changes.push(change(old_res, ChangeType::Removed, &old_res.source, ""));
        }
    }

    Ok(ReleaseDiff {
        from: old.version,
        to: new.version,
        changes,
    })
}

fn change(resource: &Resource, change_type: ChangeType, old: &str, new: &str) -> ResourceChange {
    let old = with_newline(old);
    let new = with_newline(new);
    let diff = TextDiff::from_lines(old.as_str(), new.as_str())
        .unified_diff()
        .context_radius(3)
        .to_string();

    ResourceChange {
        kind: resource.kind.clone(),
        name: resource.name.clone(),
        namespace: resource.namespace.clone(),
        change_type,
        diff,
    }
}

fn with_newline(s: &str) -> String {
    if s.is_empty() || s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{}\n", s)
    }
}
