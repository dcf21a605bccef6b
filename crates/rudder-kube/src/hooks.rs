//! Lifecycle hooks
//!
//! A hook is a rendered document annotated with `rudder.io/hook` (or the
//! Helm-compatible `helm.sh/hook`). Hooks run in batches per lifecycle event,
//! ordered by weight then name. The first failure aborts the batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cluster::ClusterClient;
use crate::error::{KubeError, Result};
use crate::manifest::Resource;

const HOOK_ANNOTATIONS: [&str; 2] = ["rudder.io/hook", "helm.sh/hook"];
const WEIGHT_ANNOTATIONS: [&str; 2] = ["rudder.io/hook-weight", "helm.sh/hook-weight"];
const DELETE_POLICY_ANNOTATIONS: [&str; 2] = [
    "rudder.io/hook-delete-policy",
    "helm.sh/hook-delete-policy",
];

/// Lifecycle event a hook can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookEvent {
    PreInstall,
    PostInstall,
    PreUpgrade,
    PostUpgrade,
    PreRollback,
    PostRollback,
    PreDelete,
    PostDelete,
    Test,
}

impl HookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreInstall => "pre-install",
            Self::PostInstall => "post-install",
            Self::PreUpgrade => "pre-upgrade",
            Self::PostUpgrade => "post-upgrade",
            Self::PreRollback => "pre-rollback",
            Self::PostRollback => "post-rollback",
            Self::PreDelete => "pre-delete",
            Self::PostDelete => "post-delete",
            Self::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "pre-install" => Self::PreInstall,
            "post-install" => Self::PostInstall,
            "pre-upgrade" => Self::PreUpgrade,
            "post-upgrade" => Self::PostUpgrade,
            "pre-rollback" => Self::PreRollback,
            "post-rollback" => Self::PostRollback,
            "pre-delete" => Self::PreDelete,
            "post-delete" => Self::PostDelete,
            "test" | "test-success" => Self::Test,
            _ => return None,
        })
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the hook resource is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// Delete the previous instance before creating a new one
    BeforeHookCreation,
    /// Delete after the hook succeeded
    HookSucceeded,
    /// Delete after the hook failed
    HookFailed,
}

/// Deletion points of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyBehavior {
    pub before_creation: bool,
    pub on_success: bool,
    pub on_failure: bool,
}

impl DeletePolicy {
    pub fn behavior(self) -> PolicyBehavior {
        let (before_creation, on_success, on_failure) = match self {
            Self::BeforeHookCreation => (true, false, false),
            Self::HookSucceeded => (false, true, false),
            Self::HookFailed => (false, false, true),
        };
        PolicyBehavior {
            before_creation,
            on_success,
            on_failure,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "before-hook-creation" => Some(Self::BeforeHookCreation),
            "hook-succeeded" => Some(Self::HookSucceeded),
            "hook-failed" => Some(Self::HookFailed),
            _ => None,
        }
    }
}

/// Execution phase of a hook's last run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPhase {
    #[default]
    Unknown,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Record of the most recent execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRun {
    pub phase: HookPhase,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A hook belonging to one release version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    /// metadata.name of the hook resource
    pub name: String,
    pub kind: String,
    /// Template that produced it
    pub path: String,
    /// Rendered document
    pub manifest: String,
    pub events: Vec<HookEvent>,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub delete_policies: Vec<DeletePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<HookRun>,
}

impl Hook {
    /// Build a hook from a resource carrying hook annotations
    ///
    /// Returns `None` when the resource is not a hook. Unknown event names
    /// and delete policies are ignored.
    pub fn from_resource(resource: &Resource) -> Option<Self> {
        let events_raw = first_annotation(resource, &HOOK_ANNOTATIONS)?;

        let events: Vec<HookEvent> = events_raw.split(',').filter_map(HookEvent::parse).collect();
        if events.is_empty() {
            warn!(hook = %resource.name, annotation = %events_raw, "hook has no known events and will never run");
        }

        let weight = first_annotation(resource, &WEIGHT_ANNOTATIONS)
            .and_then(|w| w.trim().parse().ok())
            .unwrap_or(0);

        let delete_policies = first_annotation(resource, &DELETE_POLICY_ANNOTATIONS)
            .map(|p| p.split(',').filter_map(DeletePolicy::parse).collect())
            .unwrap_or_default();

        Some(Self {
            name: resource.name.clone(),
            kind: resource.kind.clone(),
            path: resource.template.clone(),
            manifest: resource.source.clone(),
            events,
            weight,
            delete_policies,
            last_run: None,
        })
    }

    pub fn runs_on(&self, event: HookEvent) -> bool {
        self.events.contains(&event)
    }

    /// Policies in force; before-hook-creation when none is declared
    pub fn effective_policies(&self) -> Vec<DeletePolicy> {
        if self.delete_policies.is_empty() {
            vec![DeletePolicy::BeforeHookCreation]
        } else {
            self.delete_policies.clone()
        }
    }

    /// The hook document as a resource in `namespace`
    pub fn resource(&self, namespace: &str) -> Result<Resource> {
        Resource::parse(&self.manifest, &self.path, namespace)?.ok_or_else(|| {
            KubeError::InvalidManifest(format!("hook '{}' has an empty manifest", self.name))
        })
    }

    /// Copy without execution history
    pub fn fresh(&self) -> Self {
        Self {
            last_run: None,
            ..self.clone()
        }
    }
}

fn first_annotation<'a>(resource: &'a Resource, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| resource.annotation(k))
}

/// Runs hook batches against a cluster
pub struct HookExecutor<'a, C: ClusterClient + ?Sized> {
    cluster: &'a C,
    namespace: String,
    timeout: Duration,
    enabled: bool,
}

impl<'a, C: ClusterClient + ?Sized> HookExecutor<'a, C> {
    pub fn new(cluster: &'a C, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
            timeout: Duration::from_secs(300),
            enabled: true,
        }
    }

    /// Per-hook readiness timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A disabled executor makes no cluster calls and records nothing
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Run every hook attached to `event`, ordered by (weight, name)
    #[instrument(skip(self, hooks), fields(namespace = %self.namespace))]
    pub async fn execute(&self, hooks: &mut [Hook], event: HookEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut batch: Vec<usize> = (0..hooks.len()).filter(|&i| hooks[i].runs_on(event)).collect();
        batch.sort_by(|&a, &b| (hooks[a].weight, &hooks[a].name).cmp(&(hooks[b].weight, &hooks[b].name)));

        if !batch.is_empty() {
            debug!(count = batch.len(), "running hooks");
        }

        for i in batch {
            self.run(&mut hooks[i], event).await?;
        }
        Ok(())
    }

    async fn run(&self, hook: &mut Hook, event: HookEvent) -> Result<()> {
        let failure = |message: String| KubeError::HookFailure {
            hook: hook.name.clone(),
            event: event.to_string(),
            message,
        };

        let resource = hook.resource(&self.namespace).map_err(|e| failure(e.to_string()))?;
        let reference = resource.reference();
        let policies: Vec<_> = hook
            .effective_policies()
            .into_iter()
            .map(DeletePolicy::behavior)
            .collect();

        if policies.iter().any(|p| p.before_creation) {
            match self.cluster.delete(&reference).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(failure(format!("removing previous instance: {}", e))),
            }
        }

        hook.last_run = Some(HookRun {
            phase: HookPhase::Running,
            started_at: Utc::now(),
            completed_at: None,
        });

        let outcome = match self.cluster.apply(&resource).await {
            Ok(()) => {
                match tokio::time::timeout(
                    self.timeout,
                    self.cluster.wait_ready(&reference, self.timeout),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(KubeError::Timeout(format!("{:?}", self.timeout))),
                }
            }
            Err(e) => Err(e),
        };

        let succeeded = outcome.is_ok();
        if let Some(run) = hook.last_run.as_mut() {
            run.phase = if succeeded {
                HookPhase::Succeeded
            } else {
                HookPhase::Failed
            };
            run.completed_at = Some(Utc::now());
        }

        let delete_after = policies
            .iter()
            .any(|p| if succeeded { p.on_success } else { p.on_failure });
        if delete_after {
            if let Err(e) = self.cluster.delete(&reference).await {
                warn!(hook = %hook.name, error = %e, "failed to delete hook resource");
            }
        }

        match outcome {
            Ok(()) => {
                debug!(hook = %hook.name, %event, "hook succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(hook = %hook.name, %event, error = %e, "hook failed");
                Err(KubeError::HookFailure {
                    hook: hook.name.clone(),
                    event: event.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}
