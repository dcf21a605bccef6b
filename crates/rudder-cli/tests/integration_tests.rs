//! Integration tests for CLI commands
//!
//! Every test points the binary at its own file store, so nothing needs a
//! cluster: transitions run with `--dry-run` and the read-only commands work
//! on records seeded through the storage driver.

use rudder_core::{ChartMetadata, Values};
use rudder_kube::{FileDriver, Release, Status, StorageConfig, StorageDriver};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const V1_MANIFEST: &str = r#"---
# Source: configmap.yaml
apiVersion: v1
kind: ConfigMap
metadata:
  name: web-cfg
  namespace: default
data:
  message: hello
---
# Source: secret.yaml
apiVersion: v1
kind: Secret
metadata:
  name: web-token
  namespace: default
stringData:
  token: abc
---
# Source: deployment.yaml
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
spec:
  replicas: 2
"#;

const V2_MANIFEST: &str = r#"---
# Source: configmap.yaml
apiVersion: v1
kind: ConfigMap
metadata:
  name: web-cfg
  namespace: default
data:
  message: goodbye
---
# Source: service.yaml
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: default
spec:
  ports:
    - port: 80
---
# Source: deployment.yaml
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
spec:
  replicas: 2
"#;

fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn demo_chart() -> String {
    format!("{}/demo-chart", fixtures_path())
}

/// Run rudder against a file store rooted at `data_dir`
fn rudder(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rudder"))
        .args(args)
        .env("RUDDER_DRIVER", "file")
        .env("RUDDER_DATA_DIR", data_dir)
        .env("RUDDER_CONFIG", data_dir.join("no-config.yaml"))
        .env_remove("RUDDER_NAMESPACE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute rudder")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn record(version: u32, status: Status, manifest: &str, description: &str) -> Release {
    let mut chart = ChartMetadata::new("demo", semver::Version::new(0, 3, 1));
    chart.app_version = Some("1.25".to_string());
    let mut release = Release::new(
        "web",
        "default",
        version,
        chart,
        Values::from_yaml("replicas: 2\nmessage: hello\n").unwrap(),
        status,
        description,
    );
    release.manifest = manifest.to_string();
    release
}

async fn seed(dir: &Path, releases: &[Release]) {
    let driver = FileDriver::new(dir, StorageConfig::default()).unwrap();
    for release in releases {
        driver.create(release).await.unwrap();
    }
}

/// web v1 superseded, v2 deployed
async fn seeded_store() -> TempDir {
    let tmp = TempDir::new().unwrap();
    seed(
        tmp.path(),
        &[
            record(1, Status::Superseded, V1_MANIFEST, "Install complete"),
            record(2, Status::Deployed, V2_MANIFEST, "Upgrade complete"),
        ],
    )
    .await;
    tmp
}

mod basics {
    use super::*;

    #[test]
    fn test_help_lists_lifecycle_commands() {
        let tmp = TempDir::new().unwrap();
        let output = rudder(tmp.path(), &["--help"]);

        assert!(output.status.success());
        let out = stdout(&output);
        for command in ["install", "upgrade", "rollback", "uninstall", "history", "recover"] {
            assert!(out.contains(command), "missing {command} in help");
        }
        assert!(!out.contains("__complete"));
    }

    #[test]
    fn test_unknown_release_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let output = rudder(tmp.path(), &["history", "ghost"]);

        assert_eq!(output.status.code(), Some(6));
        let err = stderr(&output);
        assert!(err.contains("'ghost'") && err.contains("found"));
    }

    #[test]
    fn test_invalid_driver_is_usage_error() {
        let tmp = TempDir::new().unwrap();
        let output = Command::new(env!("CARGO_BIN_EXE_rudder"))
            .args(["list"])
            .env("RUDDER_DRIVER", "etcd")
            .env("RUDDER_CONFIG", tmp.path().join("no-config.yaml"))
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(64));
        assert!(stderr(&output).contains("RUDDER_DRIVER"));
    }

    #[test]
    fn test_config_file_sets_namespace() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("config.yaml");
        std::fs::write(&config, "namespace: staging\n").unwrap();

        let output = Command::new(env!("CARGO_BIN_EXE_rudder"))
            .args(["install", "web", &demo_chart(), "--dry-run"])
            .env("RUDDER_DRIVER", "file")
            .env("RUDDER_DATA_DIR", tmp.path().join("store"))
            .env("RUDDER_CONFIG", &config)
            .env_remove("RUDDER_NAMESPACE")
            .output()
            .unwrap();

        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("in namespace staging"));
    }
}

mod install_command {
    use super::*;

    #[test]
    fn test_dry_run_renders_without_storing() {
        let tmp = TempDir::new().unwrap();
        let output = rudder(tmp.path(), &["install", "web", &demo_chart(), "--dry-run"]);

        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("kind: ConfigMap"));
        assert!(out.contains("name: web-demo"));
        assert!(out.contains("replicas: 2"));
        assert!(out.contains("name: web-migrate"), "hook missing from dry run");
        assert!(out.contains("NOTES:"));
        assert!(out.contains("web is running 2 replica(s) of nginx:1.25."));
        assert!(out.contains("was not applied"));

        let history = rudder(tmp.path(), &["history", "web"]);
        assert_eq!(history.status.code(), Some(6));
    }

    #[test]
    fn test_set_and_values_files() {
        let tmp = TempDir::new().unwrap();
        let overrides = tmp.path().join("prod.yaml");
        std::fs::write(&overrides, "image:\n  tag: \"1.27\"\n").unwrap();

        let output = rudder(
            tmp.path(),
            &[
                "install",
                "web",
                &demo_chart(),
                "--dry-run",
                "-f",
                overrides.to_str().unwrap(),
                "--set",
                "replicas=5",
            ],
        );

        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("replicas: 5"));
        assert!(out.contains("web is running 5 replica(s) of nginx:1.27."));
    }

    #[test]
    fn test_missing_chart_is_chart_error() {
        let tmp = TempDir::new().unwrap();
        let output = rudder(
            tmp.path(),
            &["install", "web", tmp.path().join("nope").to_str().unwrap(), "--dry-run"],
        );
        assert_eq!(output.status.code(), Some(4));
    }

    #[tokio::test]
    async fn test_existing_release_is_rejected() {
        let tmp = seeded_store().await;
        let output = rudder(tmp.path(), &["install", "web", &demo_chart(), "--dry-run"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("upgrade"));
    }
}

mod read_commands {
    use super::*;

    #[tokio::test]
    async fn test_history() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["history", "web"]);
        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("REVISION"));
        assert!(out.contains("superseded"));
        assert!(out.contains("Upgrade complete"));
        assert!(out.contains("demo-0.3.1"));

        let output = rudder(tmp.path(), &["history", "web", "--max", "1", "--json"]);
        let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        let versions: Vec<u64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["version"].as_u64().unwrap())
            .collect();
        assert_eq!(versions, vec![2]);
    }

    #[tokio::test]
    async fn test_status() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["status", "web"]);
        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("STATUS: deployed"));
        assert!(out.contains("REVISION: 2"));

        let output = rudder(tmp.path(), &["status", "web", "--revision", "1", "--json"]);
        let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(json["info"]["status"], "superseded");

        let output = rudder(tmp.path(), &["status", "web", "--show-values"]);
        assert!(stdout(&output).contains("message: hello"));

        let output = rudder(tmp.path(), &["status", "web", "--revision", "9"]);
        assert_eq!(output.status.code(), Some(6));
    }

    #[tokio::test]
    async fn test_list() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["list", "--json"]);
        let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        let releases = json.as_array().unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0]["version"], 2);

        let output = rudder(tmp.path(), &["list", "--status", "failed"]);
        assert!(stdout(&output).contains("No releases found"));

        let output = rudder(tmp.path(), &["list", "-n", "other"]);
        assert!(stdout(&output).contains("No releases found"));

        let output = rudder(tmp.path(), &["list", "-A", "--filter", "we"]);
        assert!(stdout(&output).contains("web"));
    }

    #[tokio::test]
    async fn test_diff_between_revisions() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["diff", "web", "1", "2", "--json"]);
        assert!(output.status.success(), "{}", stderr(&output));
        let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        let changes = json["changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| {
                format!(
                    "{} {} {}",
                    c["changeType"].as_str().unwrap(),
                    c["kind"].as_str().unwrap(),
                    c["name"].as_str().unwrap()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        insta::assert_snapshot!(changes, @r"
        modified ConfigMap web-cfg
        added Service web
        removed Secret web-token
        ");

        let output = rudder(tmp.path(), &["diff", "web", "1", "2"]);
        let out = stdout(&output);
        assert!(out.contains("+  message: goodbye"));
        assert!(out.contains("1 added, 1 modified, 1 removed"));
    }

    #[tokio::test]
    async fn test_completion_candidates() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["__complete", "upgrade", "name", "w"]);
        assert_eq!(stdout(&output), "web\n");

        let output = rudder(tmp.path(), &["__complete", "list", "status", "sup"]);
        assert_eq!(stdout(&output), "superseded\n");

        let output = rudder(tmp.path(), &["__complete", "install", "chart"]);
        assert!(stdout(&output).is_empty());
    }
}

mod transitions {
    use super::*;

    #[tokio::test]
    async fn test_upgrade_dry_run_shows_next_revision() {
        let tmp = seeded_store().await;

        let output = rudder(
            tmp.path(),
            &["upgrade", "web", &demo_chart(), "--dry-run", "--reuse-values", "--set", "replicas=3"],
        );

        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("revision: \"3\""));
        assert!(out.contains("replicas: 3"));
        assert!(out.contains("message: \"hello\""));

        let history = rudder(tmp.path(), &["history", "web", "--json"]);
        let json: serde_json::Value = serde_json::from_str(&stdout(&history)).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_preview_diff() {
        let tmp = seeded_store().await;

        let output = rudder(
            tmp.path(),
            &["upgrade", "web", &demo_chart(), "--dry-run", "--show-diff"],
        );

        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("+ Deployment/default/web-demo"));
        assert!(out.contains("- Service/default/web"));
    }

    #[tokio::test]
    async fn test_rollback_dry_run() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["rollback", "web", "--dry-run"]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("would create revision 3 (Rollback to 1)"));

        let output = rudder(tmp.path(), &["rollback", "web", "2", "--dry-run"]);
        assert_eq!(output.status.code(), Some(2));

        let output = rudder(tmp.path(), &["rollback", "web", "7", "--dry-run"]);
        assert_eq!(output.status.code(), Some(6));
    }

    #[tokio::test]
    async fn test_uninstall_dry_run() {
        let tmp = seeded_store().await;

        let output = rudder(tmp.path(), &["uninstall", "web", "--dry-run"]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("revision 2 of web would be uninstalled"));

        let status = rudder(tmp.path(), &["status", "web", "--json"]);
        let json: serde_json::Value = serde_json::from_str(&stdout(&status)).unwrap();
        assert_eq!(json["info"]["status"], "deployed");
    }

    #[tokio::test]
    async fn test_pending_release_blocks_until_recovered() {
        let tmp = seeded_store().await;
        seed(
            tmp.path(),
            &[record(3, Status::PendingUpgrade, V2_MANIFEST, "Upgrade underway")],
        )
        .await;

        let output = rudder(tmp.path(), &["upgrade", "web", &demo_chart(), "--dry-run"]);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("recover"));

        let output = rudder(tmp.path(), &["recover", "web"]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("revision 3 is now failed"));

        let output = rudder(tmp.path(), &["recover", "web"]);
        assert_eq!(output.status.code(), Some(2));

        let output = rudder(tmp.path(), &["upgrade", "web", &demo_chart(), "--dry-run"]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stdout(&output).contains("revision: \"4\""));
    }
}
