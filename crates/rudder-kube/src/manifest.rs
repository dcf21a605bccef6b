//! Parsing rendered templates into resources and hooks
//!
//! Rendered output is split on `---` document separators. Documents carrying a
//! hook annotation become [`Hook`]s; everything else is a [`Resource`] of the
//! release manifest. Namespaced resources without an explicit namespace get the
//! release namespace.

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{KubeError, Result};
use crate::hooks::Hook;

/// Annotation to keep a resource on uninstall (Helm-compatible)
const HELM_RESOURCE_POLICY: &str = "helm.sh/resource-policy";
const RUDDER_RESOURCE_POLICY: &str = "rudder.io/resource-policy";
const RESOURCE_POLICY_KEEP: &str = "keep";

/// Marker comment recording which template produced a document
const SOURCE_PREFIX: &str = "# Source: ";

/// Kinds that never live in a namespace
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "Node",
    "PersistentVolume",
    "StorageClass",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "PriorityClass",
    "IngressClass",
    "RuntimeClass",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "APIService",
    "CSIDriver",
    "VolumeAttachment",
];

/// A Kubernetes object parsed from a rendered template
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Full object, namespace filled in
    pub body: JsonValue,
    /// The document text as rendered
    pub source: String,
    /// Template path that produced the document
    pub template: String,
}

/// Identity of a live object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

/// Key used to match resources across manifests
///
/// The API version is reduced to its group so that a `v1beta1` to `v1` move
/// is an update, not a delete and create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            group: api_group(&self.api_version).to_string(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone().unwrap_or_default(),
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl Resource {
    /// Parse one YAML document
    ///
    /// Returns `Ok(None)` for empty or comment-only documents.
    pub fn parse(doc: &str, template: &str, default_namespace: &str) -> Result<Option<Self>> {
        if is_blank_document(doc) {
            return Ok(None);
        }

        let yaml: serde_yaml::Value = serde_yaml::from_str(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("{}: YAML parse error: {}", template, e))
        })?;
        if yaml.is_null() {
            return Ok(None);
        }
        let mut body: JsonValue = serde_json::to_value(yaml).map_err(|e| {
            KubeError::InvalidManifest(format!("{}: {}", template, e))
        })?;

        let field = |body: &JsonValue, path: &[&str]| -> Option<String> {
            let mut cur = body;
            for seg in path {
                cur = cur.get(*seg)?;
            }
            cur.as_str().map(str::to_string)
        };

        let api_version = field(&body, &["apiVersion"]).ok_or_else(|| {
            KubeError::InvalidManifest(format!("{}: resource missing apiVersion", template))
        })?;
        let kind = field(&body, &["kind"]).ok_or_else(|| {
            KubeError::InvalidManifest(format!("{}: resource missing kind", template))
        })?;
        let name = field(&body, &["metadata", "name"]).ok_or_else(|| {
            KubeError::InvalidManifest(format!("{}: {} missing metadata.name", template, kind))
        })?;

        let namespace = if is_cluster_scoped(&kind) {
            None
        } else {
            let ns = field(&body, &["metadata", "namespace"])
                .unwrap_or_else(|| default_namespace.to_string());
            if let Some(meta) = body.get_mut("metadata").and_then(JsonValue::as_object_mut) {
                meta.insert("namespace".to_string(), JsonValue::String(ns.clone()));
            }
            Some(ns)
        };

        Ok(Some(Self {
            api_version,
            kind,
            name,
            namespace,
            body,
            source: strip_source_comment(doc).trim().to_string(),
            template: template.to_string(),
        }))
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.reference().key()
    }

    /// String annotation value, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(key))
            .and_then(JsonValue::as_str)
    }

    /// Check if resource has keep policy annotation
    pub fn has_keep_policy(&self) -> bool {
        [HELM_RESOURCE_POLICY, RUDDER_RESOURCE_POLICY]
            .iter()
            .any(|key| self.annotation(key).map(str::trim) == Some(RESOURCE_POLICY_KEEP))
    }

    pub fn install_order(&self) -> InstallOrder {
        InstallOrder::of(&self.kind, &self.api_version)
    }
}

/// Rendered chart output split by role
#[derive(Debug, Clone, Default)]
pub struct SplitManifest {
    pub resources: Vec<Resource>,
    pub hooks: Vec<Hook>,
    pub notes: Option<String>,
}

impl SplitManifest {
    /// Manifest text stored on the release, hooks excluded
    pub fn manifest(&self) -> String {
        manifest_text(&self.resources)
    }
}

/// Split renderer output into resources, hooks and notes
pub fn split_rendered(
    rendered: &BTreeMap<String, String>,
    namespace: &str,
) -> Result<SplitManifest> {
    let mut split = SplitManifest::default();
    let mut seen = BTreeSet::new();

    for (path, content) in rendered {
        if is_notes(path) {
            let notes = content.trim();
            if !notes.is_empty() {
                split.notes = Some(notes.to_string());
            }
            continue;
        }

        for doc in split_documents(content) {
            let Some(resource) = Resource::parse(doc, path, namespace)? else {
                continue;
            };

            if let Some(hook) = Hook::from_resource(&resource) {
                split.hooks.push(hook);
                continue;
            }

            if !seen.insert(resource.key()) {
                return Err(KubeError::InvalidManifest(format!(
                    "{} is defined more than once (last in {})",
                    resource.reference(),
                    path
                )));
            }
            split.resources.push(resource);
        }
    }

    Ok(split)
}

/// Parse a stored release manifest back into resources
pub fn parse_manifest(manifest: &str, namespace: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for doc in split_documents(manifest) {
        let template = source_of(doc).unwrap_or("manifest");
        if let Some(resource) = Resource::parse(doc, template, namespace)? {
            resources.push(resource);
        }
    }
    Ok(resources)
}

/// Join resources into the stored manifest format
pub fn manifest_text(resources: &[Resource]) -> String {
    let mut out = String::new();
    for resource in resources {
        out.push_str("---\n");
        out.push_str(SOURCE_PREFIX);
        out.push_str(&resource.template);
        out.push('\n');
        out.push_str(&resource.source);
        out.push('\n');
    }
    out
}

/// Split a multi-document YAML stream on `---` lines
pub fn split_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed.starts_with("--- ") {
            docs.push(&content[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&content[start..]);

    docs.into_iter().filter(|d| !is_blank_document(d)).collect()
}

fn is_blank_document(doc: &str) -> bool {
    doc.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with('#')
    })
}

fn is_notes(path: &str) -> bool {
    path.rsplit('/').next() == Some(rudder_engine::NOTES_FILE)
}

fn source_of(doc: &str) -> Option<&str> {
    doc.lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(SOURCE_PREFIX))
}

fn strip_source_comment(doc: &str) -> String {
    doc.lines()
        .filter(|l| !l.trim_start().starts_with(SOURCE_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Group part of an apiVersion, empty for the core group
pub fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// Resource category for apply ordering
///
/// Creates run in ascending order; deletes in descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallOrder {
    Namespace = 0,
    Crd = 1,
    NamespaceConfig = 2,
    ClusterRbac = 10,
    NamespacedRbac = 11,
    Config = 20,
    Storage = 21,
    Network = 30,
    Workload = 40,
    Batch = 50,
    Autoscaling = 60,
    CustomResource = 70,
    Other = 100,
}

impl InstallOrder {
    pub fn of(kind: &str, api_version: &str) -> Self {
        match kind {
            "Namespace" => Self::Namespace,
            "CustomResourceDefinition" => Self::Crd,
            "ResourceQuota" | "LimitRange" | "PriorityClass" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Autoscaling,
            _ if is_custom_api_version(api_version) => Self::CustomResource,
            _ => Self::Other,
        }
    }
}

fn is_custom_api_version(api_version: &str) -> bool {
    let group = api_group(api_version);
    group.contains('.') && !group.ends_with(".k8s.io")
}

/// Sort for creation: dependencies first
pub fn sort_for_install(resources: &mut [Resource]) {
    resources.sort_by(|a, b| {
        (a.install_order(), &a.kind, &a.namespace, &a.name).cmp(&(
            b.install_order(),
            &b.kind,
            &b.namespace,
            &b.name,
        ))
    });
}

/// Sort for deletion: exact reverse of install order
pub fn sort_for_delete(resources: &mut [Resource]) {
    sort_for_install(resources);
    resources.reverse();
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
---
# only a comment
---
apiVersion: v1
kind: Namespace
metadata:
  name: team-a
---
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
  annotations:
    helm.sh/hook: pre-install,pre-upgrade
"#;

    fn rendered(files: &[(&str, &str)]) -> BTreeMap<String, String> {
        files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_split_documents_skips_blank_and_comments() {
        let docs = split_documents(MIXED);
        assert_eq!(docs.len(), 3);
        assert!(docs[0].contains("Deployment"));
    }

    #[test]
    fn test_split_rendered_routes_hooks_and_notes() {
        let split = split_rendered(
            &rendered(&[("all.yaml", MIXED), ("NOTES.txt", "  Enjoy  \n")]),
            "prod",
        )
        .unwrap();

        assert_eq!(split.resources.len(), 2);
        assert_eq!(split.hooks.len(), 1);
        assert_eq!(split.hooks[0].name, "migrate");
        assert_eq!(split.notes.as_deref(), Some("Enjoy"));

        let deploy = &split.resources[0];
        assert_eq!(deploy.namespace.as_deref(), Some("prod"));
        assert_eq!(deploy.body["metadata"]["namespace"], "prod");

        let ns = &split.resources[1];
        assert_eq!(ns.namespace, None);
    }

    #[test]
    fn test_duplicate_resources_rejected() {
        let doc = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n";
        let err = split_rendered(&rendered(&[("a.yaml", doc), ("b.yaml", doc)]), "default")
            .unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest(_)));
    }

    #[test]
    fn test_missing_name_is_invalid() {
        let err = Resource::parse("apiVersion: v1\nkind: ConfigMap\n", "cm.yaml", "default")
            .unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_manifest_text_roundtrip_keeps_source() {
        let split = split_rendered(&rendered(&[("all.yaml", MIXED)]), "prod").unwrap();
        let text = split.manifest();
        assert!(text.starts_with("---\n# Source: all.yaml\n"));

        let parsed = parse_manifest(&text, "prod").unwrap();
        assert_eq!(parsed, split.resources);
    }

    #[test]
    fn test_key_ignores_api_version_revision() {
        let a = Resource::parse(
            "apiVersion: autoscaling/v1\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: h\n",
            "h.yaml",
            "ns",
        )
        .unwrap()
        .unwrap();
        let b = Resource::parse(
            "apiVersion: autoscaling/v2\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: h\n",
            "h.yaml",
            "ns",
        )
        .unwrap()
        .unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_keep_policy() {
        let res = Resource::parse(
            "apiVersion: v1\nkind: PersistentVolumeClaim\nmetadata:\n  name: data\n  annotations:\n    helm.sh/resource-policy: keep\n",
            "pvc.yaml",
            "ns",
        )
        .unwrap()
        .unwrap();
        assert!(res.has_keep_policy());
    }

    #[test]
    fn test_install_order() {
        let doc = |kind: &str, api: &str| {
            Resource::parse(
                &format!("apiVersion: {}\nkind: {}\nmetadata:\n  name: x\n", api, kind),
                "t.yaml",
                "ns",
            )
            .unwrap()
            .unwrap()
        };
        let mut resources = vec![
            doc("Widget", "example.com/v1"),
            doc("Deployment", "apps/v1"),
            doc("Service", "v1"),
            doc("ConfigMap", "v1"),
            doc("ClusterRole", "rbac.authorization.k8s.io/v1"),
            doc("CustomResourceDefinition", "apiextensions.k8s.io/v1"),
            doc("Namespace", "v1"),
        ];
        sort_for_install(&mut resources);
        let kinds: Vec<&str> = resources.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "Namespace",
                "CustomResourceDefinition",
                "ClusterRole",
                "ConfigMap",
                "Service",
                "Deployment",
                "Widget"
            ]
        );

        sort_for_delete(&mut resources);
        assert_eq!(resources[0].kind, "Widget");
        assert_eq!(resources[6].kind, "Namespace");
    }
}
