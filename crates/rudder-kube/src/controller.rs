//! Release transition controller
//!
//! [`ReleaseManager`] drives install, upgrade, rollback and uninstall through
//! the store, the hook executor and the diff/apply engine. Every transition
//! writes a pending record first and finishes it as `deployed`, `deleted` or
//! `failed`; failures come back as [`KubeError::Transition`] carrying the
//! record as persisted.

use rudder_core::{LoadedChart, ReleaseInfo, Values};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration as StdDuration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::actions::{InstallOptions, RollbackOptions, UninstallOptions, UpgradeOptions};
use crate::cluster::ClusterClient;
use crate::diff::{ActionPlan, ApplyReport, ReleaseDiff, apply_plan, diff_releases};
use crate::error::{KubeError, Result};
use crate::hooks::{Hook, HookEvent, HookExecutor};
use crate::manifest::{Resource, SplitManifest, parse_manifest, split_rendered};
use crate::release::{Release, Status};
use crate::render::Renderer;
use crate::storage::StorageDriver;

/// Filter for [`ReleaseManager::list`]
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only releases whose latest version has this status
    pub status: Option<Status>,

    /// Only names containing this substring
    pub name_contains: Option<String>,
}

impl ListFilter {
    pub fn matches(&self, release: &Release) -> bool {
        self.status.is_none_or(|s| release.status() == s)
            && self
                .name_contains
                .as_deref()
                .is_none_or(|needle| release.name.contains(needle))
    }
}

/// Steps shared by install, upgrade and rollback
struct Rollout {
    pre: HookEvent,
    post: HookEvent,
    wait: bool,
    timeout: StdDuration,
    hooks: bool,
}

/// A failed rollout, and whether it had already changed the cluster
struct RolloutFailure {
    error: KubeError,
    crossed: bool,
}

type LockTable = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Exclusive hold on one release name
///
/// Dropping it forgets the name's lock once no other transition is waiting.
struct ReleaseLock<'a> {
    table: &'a LockTable,
    key: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ReleaseLock<'_> {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // Only the table and this hold remain
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.key);
        }
    }
}

/// Coordinates release transitions
pub struct ReleaseManager<S, C, R> {
    storage: S,
    cluster: C,
    renderer: R,
    /// `namespace/name` -> lock held for the length of a transition
    locks: LockTable,
}

impl<S, C, R> ReleaseManager<S, C, R>
where
    S: StorageDriver,
    C: ClusterClient,
    R: Renderer,
{
    pub fn new(storage: S, cluster: C, renderer: R) -> Self {
        Self {
            storage,
            cluster,
            renderer,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    // ========== Install ==========

    /// Install a chart as a new release, or reuse a deleted or failed name
    #[instrument(skip_all, fields(release = %opts.name, namespace = %opts.namespace))]
    pub async fn install(
        &self,
        chart: &LoadedChart,
        values: Values,
        opts: &InstallOptions,
    ) -> Result<Release> {
        let _guard = self.lock(&opts.namespace, &opts.name).await;
        let history = self.storage.history(&opts.namespace, &opts.name).await?;

        if let Some(last) = history.last() {
            ensure_not_pending(last)?;
        }
        if let Some(deployed) = deployed_in(&history, &opts.name)? {
            return Err(KubeError::InvalidState {
                name: opts.name.clone(),
                action: "install",
                reason: format!("version {} is already deployed; use upgrade", deployed.version),
            });
        }
        if let Some(last) = history.last()
            && !matches!(last.status(), Status::Deleted | Status::Failed)
        {
            return Err(KubeError::InvalidState {
                name: opts.name.clone(),
                action: "install",
                reason: format!("latest version {} is {}", last.version, last.status()),
            });
        }

        let version = next_version(&history);
        let values = compute_values(chart, None, &values)?;
        let info = ReleaseInfo::for_install(&opts.name, &opts.namespace, version);
        let split = self.render(chart, &values, &info)?;

        let mut release = Release::new(
            &opts.name,
            &opts.namespace,
            version,
            chart.metadata.clone(),
            values,
            Status::PendingInstall,
            "Initial install underway",
        );
        fill_release(&mut release, &split, &opts.labels, opts.timeout);

        if opts.dry_run {
            release.info.description = "Dry run complete".to_string();
            return Ok(release);
        }

        self.storage.create(&release).await?;
        debug!(version, resources = split.resources.len(), hooks = release.hooks.len(), "install started");

        let plan = ActionPlan::compute(&[], &split.resources);
        let steps = Rollout {
            pre: HookEvent::PreInstall,
            post: HookEvent::PostInstall,
            wait: opts.wait,
            timeout: to_std(opts.timeout),
            hooks: !opts.disable_hooks,
        };

        match self.rollout(&mut release, &plan, &steps).await {
            Ok(report) => {
                release.mark_deployed(Some(
                    opts.description.as_deref().unwrap_or("Install complete"),
                ));
                self.storage.update(&release).await?;
                info!(version, summary = %report.summary(), "release installed");
                self.prune_history(&release, opts.max_history).await;
                Ok(release)
            }
            Err(failure) => Err(self.fail(release, failure.error).await),
        }
    }

    // ========== Upgrade ==========

    /// Upgrade the deployed release to a new chart or values
    #[instrument(skip_all, fields(release = %opts.name, namespace = %opts.namespace))]
    pub async fn upgrade(
        &self,
        chart: &LoadedChart,
        values: Values,
        opts: &UpgradeOptions,
    ) -> Result<Release> {
        let _guard = self.lock(&opts.namespace, &opts.name).await;
        let history = self.storage.history(&opts.namespace, &opts.name).await?;

        let last = history
            .last()
            .ok_or_else(|| KubeError::release_not_found(&opts.name))?;
        ensure_not_pending(last)?;
        let previous = deployed_in(&history, &opts.name)?
            .ok_or_else(|| KubeError::InvalidState {
                name: opts.name.clone(),
                action: "upgrade",
                reason: format!(
                    "no deployed version (latest is {} {})",
                    last.version,
                    last.status()
                ),
            })?
            .clone();

        let version = next_version(&history);
        let values = compute_values(
            chart,
            opts.reuse_values.then_some(&previous.values),
            &values,
        )?;
        let info = ReleaseInfo::for_upgrade(&opts.name, &opts.namespace, version);
        let split = self.render(chart, &values, &info)?;
        let old_resources = parse_manifest(&previous.manifest, &opts.namespace)?;

        let mut release = Release::new(
            &opts.name,
            &opts.namespace,
            version,
            chart.metadata.clone(),
            values,
            Status::PendingUpgrade,
            "Preparing upgrade",
        );
        fill_release(&mut release, &split, &opts.labels, opts.timeout);

        if opts.dry_run {
            release.info.description = "Dry run complete".to_string();
            return Ok(release);
        }

        self.storage.create(&release).await?;

        let plan = ActionPlan::compute(&old_resources, &split.resources);
        debug!(
            version,
            create = plan.create.len(),
            update = plan.update.len(),
            delete = plan.delete.len(),
            "upgrade started"
        );
        let steps = Rollout {
            pre: HookEvent::PreUpgrade,
            post: HookEvent::PostUpgrade,
            wait: opts.wait,
            timeout: to_std(opts.timeout),
            hooks: !opts.disable_hooks,
        };

        match self.rollout(&mut release, &plan, &steps).await {
            Ok(report) => {
                if let Err(e) = self.supersede(previous).await {
                    return Err(self.fail(release, e).await);
                }
                release.mark_deployed(Some(
                    opts.description.as_deref().unwrap_or("Upgrade complete"),
                ));
                self.storage.update(&release).await?;
                info!(version, summary = %report.summary(), "release upgraded");
                self.prune_history(&release, opts.max_history).await;
                Ok(release)
            }
            Err(RolloutFailure { error, crossed }) => {
                // The previous version keeps running unless the cluster was changed
                if crossed && let Err(e) = self.supersede(previous).await {
                    warn!(error = %e, "could not supersede previous version");
                }
                Err(self.fail(release, error).await)
            }
        }
    }

    // ========== Rollback ==========

    /// Roll back to an earlier version, recorded as a new version
    #[instrument(skip_all, fields(release = %opts.name, namespace = %opts.namespace, target = opts.version))]
    pub async fn rollback(&self, opts: &RollbackOptions) -> Result<Release> {
        let _guard = self.lock(&opts.namespace, &opts.name).await;
        let history = self.storage.history(&opts.namespace, &opts.name).await?;

        let last = history
            .last()
            .ok_or_else(|| KubeError::release_not_found(&opts.name))?;
        ensure_not_pending(last)?;
        let deployed = deployed_in(&history, &opts.name)?;
        let current = deployed.unwrap_or(last).clone();

        let target = rollback_target(&history, &current, deployed, opts)?.clone();
        let description = opts
            .description
            .clone()
            .unwrap_or_else(|| format!("Rollback to {}", target.version));

        let mut release = Release::new(
            &opts.name,
            &opts.namespace,
            next_version(&history),
            target.chart.clone(),
            target.values.clone(),
            Status::PendingRollback,
            format!("Preparing rollback to {}", target.version),
        );
        release.manifest = target.manifest.clone();
        release.notes = target.notes.clone();
        release.labels = target.labels.clone();
        release.hooks = target.hooks.iter().map(Hook::fresh).collect();
        release.info.timeout = opts.timeout;

        if opts.dry_run {
            release.info.description = description;
            return Ok(release);
        }

        let old_resources = parse_manifest(&current.manifest, &opts.namespace)?;
        let new_resources = parse_manifest(&target.manifest, &opts.namespace)?;

        self.storage.create(&release).await?;
        debug!(version = release.version, from = current.version, "rollback started");

        let plan = ActionPlan::compute(&old_resources, &new_resources);
        let steps = Rollout {
            pre: HookEvent::PreRollback,
            post: HookEvent::PostRollback,
            wait: opts.wait,
            timeout: to_std(opts.timeout),
            hooks: !opts.disable_hooks,
        };

        let outcome = self.rollout(&mut release, &plan, &steps).await;

        // The version rolled away from is replaced whatever the outcome
        if let Err(e) = self.supersede(current).await {
            warn!(error = %e, "could not supersede current version");
        }

        match outcome {
            Ok(report) => {
                release.mark_deployed(Some(&description));
                self.storage.update(&release).await?;
                info!(version = release.version, target = target.version, summary = %report.summary(), "release rolled back");
                self.prune_history(&release, opts.max_history).await;
                Ok(release)
            }
            Err(failure) => Err(self.fail(release, failure.error).await),
        }
    }

    // ========== Uninstall ==========

    /// Delete a release's resources and mark it deleted
    ///
    /// History is kept so the name can be rolled back or reinstalled.
    #[instrument(skip_all, fields(release = %opts.name, namespace = %opts.namespace))]
    pub async fn uninstall(&self, opts: &UninstallOptions) -> Result<Release> {
        let _guard = self.lock(&opts.namespace, &opts.name).await;
        let history = self.storage.history(&opts.namespace, &opts.name).await?;

        let last = history
            .last()
            .ok_or_else(|| KubeError::release_not_found(&opts.name))?;
        ensure_not_pending(last)?;
        let mut release = deployed_in(&history, &opts.name)?.unwrap_or(last).clone();

        if release.status() == Status::Deleted {
            return Err(KubeError::InvalidState {
                name: opts.name.clone(),
                action: "uninstall",
                reason: "release is already uninstalled".to_string(),
            });
        }

        let description = opts
            .description
            .as_deref()
            .unwrap_or("Uninstallation complete");
        let resources = parse_manifest(&release.manifest, &opts.namespace)?;

        if opts.dry_run {
            release.mark_deleted(description);
            return Ok(release);
        }

        release.mark_pending(Status::PendingDelete, "Deletion in progress");
        release.info.timeout = opts.timeout;
        self.storage.update(&release).await?;

        let executor = HookExecutor::new(&self.cluster, opts.namespace.clone())
            .timeout(to_std(opts.timeout))
            .enabled(!opts.disable_hooks);

        if let Err(e) = executor.execute(&mut release.hooks, HookEvent::PreDelete).await {
            return Err(self.fail(release, e).await);
        }

        if opts.keep {
            debug!(resources = resources.len(), "keeping resources");
        } else {
            let report = apply_plan(&self.cluster, &ActionPlan::deletion(resources)).await;
            debug!(summary = %report.summary(), "resources deleted");
            if let Err(e) = report.into_result() {
                return Err(self.fail(release, e).await);
            }
        }

        if let Err(e) = executor.execute(&mut release.hooks, HookEvent::PostDelete).await {
            return Err(self.fail(release, e).await);
        }

        release.mark_deleted(description);
        self.storage.update(&release).await?;
        info!(version = release.version, "release uninstalled");
        Ok(release)
    }

    // ========== Recovery and queries ==========

    /// Mark a release stuck in a pending state as failed
    #[instrument(skip(self))]
    pub async fn recover(&self, namespace: &str, name: &str) -> Result<Release> {
        let _guard = self.lock(namespace, name).await;
        let mut release = self.storage.last(namespace, name).await?;

        if !release.status().is_pending() {
            return Err(KubeError::InvalidState {
                name: name.to_string(),
                action: "recover",
                reason: format!("version {} is {}, not pending", release.version, release.status()),
            });
        }
        if !release.is_stuck() {
            warn!(version = release.version, "pending operation has not reached its timeout");
        }

        release.mark_failed("Manually recovered from stuck state");
        self.storage.update(&release).await?;
        Ok(release)
    }

    /// Every version of a release, oldest first
    pub async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Release>> {
        let history = self.storage.history(namespace, name).await?;
        if history.is_empty() {
            return Err(KubeError::release_not_found(name));
        }
        Ok(history)
    }

    /// A specific version, or the latest one
    pub async fn status(&self, namespace: &str, name: &str, version: Option<u32>) -> Result<Release> {
        match version {
            Some(v) => self.storage.get(namespace, name, v).await,
            None => self.storage.last(namespace, name).await,
        }
    }

    /// Latest version of every release, optionally within one namespace
    pub async fn list(&self, namespace: Option<&str>, filter: &ListFilter) -> Result<Vec<Release>> {
        Ok(self
            .storage
            .list(namespace)
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    /// Text diff between two stored versions
    pub async fn diff(&self, namespace: &str, name: &str, from: u32, to: u32) -> Result<ReleaseDiff> {
        let old = self.storage.get(namespace, name, from).await?;
        let new = self.storage.get(namespace, name, to).await?;
        diff_releases(&old, &new)
    }

    /// Diff a deployed release against what an upgrade would apply
    pub async fn preview_upgrade(
        &self,
        chart: &LoadedChart,
        values: Values,
        opts: &UpgradeOptions,
    ) -> Result<ReleaseDiff> {
        let deployed = self.storage.deployed(&opts.namespace, &opts.name).await?;
        let planned = self
            .upgrade(chart, values, &UpgradeOptions { dry_run: true, ..opts.clone() })
            .await?;
        diff_releases(&deployed, &planned)
    }

    // ========== Internal helpers ==========

    async fn lock(&self, namespace: &str, name: &str) -> ReleaseLock<'_> {
        let key = format!("{}/{}", namespace, name);
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        ReleaseLock {
            table: &self.locks,
            key,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn render(&self, chart: &LoadedChart, values: &Values, info: &ReleaseInfo) -> Result<SplitManifest> {
        let rendered = self.renderer.render(chart, values, info)?;
        split_rendered(&rendered, &info.namespace)
    }

    /// Pre hooks, apply, optional wait, post hooks
    async fn rollout(
        &self,
        release: &mut Release,
        plan: &ActionPlan,
        steps: &Rollout,
    ) -> std::result::Result<ApplyReport, RolloutFailure> {
        let untouched = |error: KubeError| RolloutFailure { error, crossed: false };

        let executor = HookExecutor::new(&self.cluster, release.namespace.clone())
            .timeout(steps.timeout)
            .enabled(steps.hooks);

        executor
            .execute(&mut release.hooks, steps.pre)
            .await
            .map_err(untouched)?;

        let report = apply_plan(&self.cluster, plan).await;
        let crossed = report.crossed_threshold();
        let touched = |error: KubeError| RolloutFailure { error, crossed };

        let report = report.into_result().map_err(touched)?;

        if steps.wait {
            let targets: Vec<&Resource> = plan.create.iter().chain(&plan.update).collect();
            self.wait_for(&targets, steps.timeout).await.map_err(touched)?;
        }

        executor
            .execute(&mut release.hooks, steps.post)
            .await
            .map_err(touched)?;

        Ok(report)
    }

    /// Wait for every resource under one shared deadline
    async fn wait_for(&self, resources: &[&Resource], timeout: StdDuration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        for resource in resources {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(KubeError::Timeout(format!("{:?} waiting for resources", timeout)));
            }
            self.cluster.wait_ready(&resource.reference(), remaining).await?;
        }
        Ok(())
    }

    async fn supersede(&self, mut release: Release) -> Result<()> {
        release.mark_superseded();
        self.storage.update(&release).await
    }

    /// Persist the release as failed and wrap the cause
    async fn fail(&self, mut release: Release, error: KubeError) -> KubeError {
        warn!(version = release.version, error = %error, "transition failed");
        release.mark_failed(error.to_string());
        if let Err(e) = self.storage.update(&release).await {
            warn!(error = %e, "could not record failed release");
        }
        KubeError::Transition {
            release: Box::new(release),
            source: Box::new(error),
        }
    }

    /// Delete the oldest records beyond `max_history`
    ///
    /// The deployed and the latest record always survive.
    async fn prune_history(&self, release: &Release, max_history: Option<usize>) {
        let Some(max) = max_history else {
            return;
        };
        let history = match self.storage.history(&release.namespace, &release.name).await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "could not read history for pruning");
                return;
            }
        };

        let excess = history.len().saturating_sub(max.max(1));
        let latest = history.last().map(|r| r.version);
        let prunable = history
            .iter()
            .filter(|r| r.status() != Status::Deployed && Some(r.version) != latest)
            .take(excess);

        for old in prunable {
            match self.storage.delete(&old.namespace, &old.name, old.version).await {
                Ok(_) => debug!(version = old.version, "pruned release record"),
                Err(e) => warn!(version = old.version, error = %e, "could not prune release record"),
            }
        }
    }
}

fn ensure_not_pending(last: &Release) -> Result<()> {
    if last.status().is_pending() {
        return Err(KubeError::OperationInProgress {
            name: last.name.clone(),
            status: last.status().to_string(),
        });
    }
    Ok(())
}

/// The single deployed version, if any
fn deployed_in<'a>(history: &'a [Release], name: &str) -> Result<Option<&'a Release>> {
    let deployed: Vec<&Release> = history
        .iter()
        .filter(|r| r.status() == Status::Deployed)
        .collect();
    match deployed.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(one)),
        many => Err(KubeError::MultipleDeployed {
            name: name.to_string(),
            versions: many.iter().map(|r| r.version).collect(),
        }),
    }
}

fn next_version(history: &[Release]) -> u32 {
    history.last().map_or(1, |r| r.version + 1)
}

/// Chart defaults, then the previous values, then the supplied values
fn compute_values(chart: &LoadedChart, previous: Option<&Values>, supplied: &Values) -> Result<Values> {
    let mut values = chart.default_values()?;
    if let Some(previous) = previous {
        values.merge(previous);
    }
    values.merge(supplied);
    Ok(values)
}

fn fill_release(
    release: &mut Release,
    split: &SplitManifest,
    labels: &std::collections::BTreeMap<String, String>,
    timeout: chrono::Duration,
) {
    release.manifest = split.manifest();
    release.hooks = split.hooks.clone();
    release.notes = split.notes.clone();
    release.labels = labels.clone();
    release.info.timeout = timeout;
}

/// Resolve the version a rollback returns to
///
/// Version 0 means the newest earlier version that was once live; failed
/// versions are skipped.
fn rollback_target<'a>(
    history: &'a [Release],
    current: &Release,
    deployed: Option<&Release>,
    opts: &RollbackOptions,
) -> Result<&'a Release> {
    if opts.version == 0 {
        return history
            .iter()
            .rev()
            .find(|r| {
                r.version < current.version
                    && matches!(
                        r.status(),
                        Status::Superseded | Status::Deployed | Status::Deleted
                    )
            })
            .ok_or_else(|| KubeError::InvalidState {
                name: opts.name.clone(),
                action: "roll back",
                reason: format!("no version before {} to roll back to", current.version),
            });
    }

    if deployed.is_some_and(|d| d.version == opts.version) {
        return Err(KubeError::InvalidState {
            name: opts.name.clone(),
            action: "roll back",
            reason: format!("version {} is already deployed", opts.version),
        });
    }

    history
        .iter()
        .find(|r| r.version == opts.version)
        .ok_or_else(|| KubeError::version_not_found(&opts.name, opts.version))
}

fn to_std(timeout: chrono::Duration) -> StdDuration {
    timeout.to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;
    use crate::storage::MemoryDriver;
    use rudder_core::ChartMetadata;

    fn rel(version: u32, status: Status) -> Release {
        Release::new(
            "web",
            "default",
            version,
            ChartMetadata::new("demo", semver::Version::new(1, 0, 0)),
            Values::new(),
            status,
            "",
        )
    }

    #[test]
    fn test_deployed_in() {
        let history = vec![rel(1, Status::Superseded), rel(2, Status::Deployed), rel(3, Status::Failed)];
        assert_eq!(deployed_in(&history, "web").unwrap().map(|r| r.version), Some(2));
        assert!(deployed_in(&history[..1], "web").unwrap().is_none());

        let broken = vec![rel(1, Status::Deployed), rel(2, Status::Deployed)];
        assert!(matches!(
            deployed_in(&broken, "web"),
            Err(KubeError::MultipleDeployed { .. })
        ));
    }

    #[test]
    fn test_previous_rollback_target_skips_failed() {
        let history = vec![
            rel(1, Status::Superseded),
            rel(2, Status::Failed),
            rel(3, Status::Deployed),
        ];
        let opts = RollbackOptions::new("web", "default");
        let target = rollback_target(&history, &history[2], Some(&history[2]), &opts).unwrap();
        assert_eq!(target.version, 1);
    }

    #[test]
    fn test_explicit_rollback_target_checks() {
        let history = vec![rel(1, Status::Superseded), rel(2, Status::Deployed)];
        let current = Some(&history[1]);

        let same = RollbackOptions::new("web", "default").to_version(2);
        assert!(matches!(
            rollback_target(&history, &history[1], current, &same),
            Err(KubeError::InvalidState { .. })
        ));

        let missing = RollbackOptions::new("web", "default").to_version(9);
        assert!(matches!(
            rollback_target(&history, &history[1], current, &missing),
            Err(KubeError::NotFound { .. })
        ));

        let first = RollbackOptions::new("web", "default").to_version(1);
        assert_eq!(rollback_target(&history, &history[1], current, &first).unwrap().version, 1);
    }

    #[test]
    fn test_no_previous_version() {
        let history = vec![rel(1, Status::Deployed)];
        let opts = RollbackOptions::new("web", "default");
        assert!(matches!(
            rollback_target(&history, &history[0], Some(&history[0]), &opts),
            Err(KubeError::InvalidState { action: "roll back", .. })
        ));
    }

    #[test]
    fn test_list_filter() {
        let filter = ListFilter {
            status: Some(Status::Deployed),
            name_contains: Some("we".to_string()),
        };
        assert!(filter.matches(&rel(1, Status::Deployed)));
        assert!(!filter.matches(&rel(1, Status::Failed)));
        assert!(ListFilter::default().matches(&rel(1, Status::Failed)));
    }

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(&[]), 1);
        assert_eq!(next_version(&[rel(1, Status::Superseded), rel(4, Status::Deleted)]), 5);
    }

    #[tokio::test]
    async fn test_locks_are_forgotten_when_released() {
        let manager = ReleaseManager::new(
            MemoryDriver::new(),
            MockCluster::new(),
            rudder_engine::Engine::default(),
        );

        {
            let _held = manager.lock("default", "web").await;
            assert_eq!(manager.tracked_locks(), 1);
        }
        assert_eq!(manager.tracked_locks(), 0);

        // A queued transition keeps the entry until it is done
        let first = manager.lock("default", "web").await;
        let waiting = async {
            let _held = manager.lock("default", "web").await;
            manager.tracked_locks()
        };
        let release = async move {
            tokio::task::yield_now().await;
            drop(first);
        };
        let (while_held, ()) = tokio::join!(waiting, release);
        assert_eq!(while_held, 1);
        assert_eq!(manager.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_transitions_leave_no_locks_behind() {
        let manager = ReleaseManager::new(
            MemoryDriver::new(),
            MockCluster::new(),
            rudder_engine::Engine::default(),
        );
        assert!(manager.recover("default", "ghost").await.is_err());
        assert!(manager.uninstall(&UninstallOptions::new("web", "default")).await.is_err());
        assert_eq!(manager.tracked_locks(), 0);
    }
}
