//! Dynamic shell completion
//!
//! Shells call `rudder __complete <command> <arg> [prefix]` and get one
//! candidate per line. Candidates come from a [`CompletionRegistry`] built
//! once at startup and handed to the dispatcher.

use rudder_kube::{Release, Status};
use std::collections::{BTreeSet, HashMap};

/// Data a completion function may look at
#[derive(Debug, Default)]
pub struct CompletionContext {
    /// Namespace given on the command line, if any
    pub namespace: Option<String>,
    /// Latest record of every release the store knows about
    pub releases: Vec<Release>,
}

pub type CompletionFn = fn(&CompletionContext, &str) -> Vec<String>;

/// Wildcard command key; matches any command for the given argument
const ANY: &str = "*";

/// Maps `(command, argument)` to a candidate generator
pub struct CompletionRegistry {
    entries: HashMap<(&'static str, &'static str), CompletionFn>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with every completion the CLI ships
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for command in [
            "upgrade",
            "rollback",
            "uninstall",
            "history",
            "status",
            "recover",
            "diff",
        ] {
            registry.register(command, "name", release_names);
        }
        registry.register("list", "status", statuses);
        registry.register(ANY, "namespace", namespaces);
        registry
    }

    pub fn register(&mut self, command: &'static str, arg: &'static str, f: CompletionFn) {
        self.entries.insert((command, arg), f);
    }

    pub fn lookup(&self, command: &str, arg: &str) -> Option<CompletionFn> {
        self.entries
            .iter()
            .find(|((c, a), _)| *c == command && *a == arg)
            .or_else(|| self.entries.iter().find(|((c, a), _)| *c == ANY && *a == arg))
            .map(|(_, f)| *f)
    }

    /// True when the argument completes from stored releases
    pub fn needs_releases(&self, command: &str, arg: &str) -> bool {
        matches!(arg, "name" | "namespace") && self.lookup(command, arg).is_some()
    }

    /// Candidates for `arg` of `command`, empty when nothing is registered
    pub fn complete(
        &self,
        ctx: &CompletionContext,
        command: &str,
        arg: &str,
        prefix: &str,
    ) -> Vec<String> {
        self.lookup(command, arg)
            .map(|f| f(ctx, prefix))
            .unwrap_or_default()
    }
}

impl Default for CompletionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn release_names(ctx: &CompletionContext, prefix: &str) -> Vec<String> {
    ctx.releases
        .iter()
        .filter(|r| ctx.namespace.as_deref().is_none_or(|ns| r.namespace == ns))
        .filter(|r| r.status() != Status::Deleted)
        .map(|r| r.name.clone())
        .filter(|name| name.starts_with(prefix))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn namespaces(ctx: &CompletionContext, prefix: &str) -> Vec<String> {
    ctx.releases
        .iter()
        .map(|r| r.namespace.clone())
        .filter(|ns| ns.starts_with(prefix))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn statuses(_: &CompletionContext, prefix: &str) -> Vec<String> {
    [
        Status::Deployed,
        Status::Deleted,
        Status::Superseded,
        Status::Failed,
        Status::PendingInstall,
        Status::PendingUpgrade,
        Status::PendingRollback,
        Status::PendingDelete,
    ]
    .into_iter()
    .map(Status::as_str)
    .filter(|s| s.starts_with(prefix))
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_core::{ChartMetadata, Values};

    fn release(name: &str, namespace: &str, status: Status) -> Release {
        Release::new(
            name,
            namespace,
            1,
            ChartMetadata::new("demo", semver::Version::new(1, 0, 0)),
            Values::new(),
            status,
            "",
        )
    }

    fn context() -> CompletionContext {
        CompletionContext {
            namespace: None,
            releases: vec![
                release("web", "default", Status::Deployed),
                release("worker", "jobs", Status::Failed),
                release("gone", "default", Status::Deleted),
                release("web", "staging", Status::Deployed),
            ],
        }
    }

    #[test]
    fn test_release_names() {
        let registry = CompletionRegistry::builtin();
        let ctx = context();

        assert_eq!(
            registry.complete(&ctx, "upgrade", "name", "w"),
            vec!["web".to_string(), "worker".to_string()]
        );
        assert!(registry.complete(&ctx, "status", "name", "g").is_empty());
    }

    #[test]
    fn test_release_names_scoped_to_namespace() {
        let registry = CompletionRegistry::builtin();
        let ctx = CompletionContext {
            namespace: Some("jobs".to_string()),
            ..context()
        };
        assert_eq!(registry.complete(&ctx, "rollback", "name", ""), vec!["worker"]);
    }

    #[test]
    fn test_namespace_wildcard() {
        let registry = CompletionRegistry::builtin();
        assert_eq!(
            registry.complete(&context(), "history", "namespace", ""),
            vec!["default", "jobs", "staging"]
        );
    }

    #[test]
    fn test_statuses() {
        let registry = CompletionRegistry::builtin();
        assert_eq!(
            registry.complete(&CompletionContext::default(), "list", "status", "pending-u"),
            vec!["pending-upgrade"]
        );
        assert!(!registry.needs_releases("list", "status"));
    }

    #[test]
    fn test_unknown_argument() {
        let registry = CompletionRegistry::builtin();
        assert!(registry.complete(&context(), "install", "chart", "").is_empty());
        assert!(registry.lookup("install", "name").is_none());
    }

    #[test]
    fn test_custom_registration() {
        fn fixed(_: &CompletionContext, _: &str) -> Vec<String> {
            vec!["x".to_string()]
        }
        let mut registry = CompletionRegistry::new();
        registry.register("install", "chart", fixed);
        assert_eq!(
            registry.complete(&CompletionContext::default(), "install", "chart", ""),
            vec!["x"]
        );
    }
}
