//! Uninstall command - remove a release's resources and mark it deleted

use clap::Args;
use console::style;
use rudder_kube::UninstallOptions;
use std::time::Duration;

use super::{chrono_timeout, manager, parse_timeout};
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// Release name
    pub name: String,

    /// Leave the release's resources in the cluster
    #[arg(long)]
    pub keep: bool,

    /// Skip pre-delete and post-delete hooks
    #[arg(long)]
    pub no_hooks: bool,

    /// Show what would happen without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Time allowed for each hook, e.g. 90s or 5m
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Description recorded on the deleted release
    #[arg(long)]
    pub description: Option<String>,
}

pub async fn run(settings: &Settings, args: &UninstallArgs) -> Result<()> {
    let opts = UninstallOptions {
        timeout: chrono_timeout(args.timeout.unwrap_or(settings.timeout))?,
        disable_hooks: args.no_hooks,
        keep: args.keep,
        dry_run: args.dry_run,
        description: args.description.clone(),
        ..UninstallOptions::new(&args.name, &settings.namespace)
    };

    display::step(format!("Uninstalling {}", style(&args.name).cyan()));

    let manager = manager(settings).await?;
    let spinner = (!opts.dry_run).then(|| display::spinner("Uninstalling..."));
    let result = manager.uninstall(&opts).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let release = result?;

    if opts.dry_run {
        display::success(format!(
            "Dry run: revision {} of {} would be uninstalled",
            style(release.version).yellow(),
            style(&release.name).cyan()
        ));
        return Ok(());
    }

    display::success(format!(
        "Uninstalled {} (revision {})",
        style(&release.name).cyan(),
        style(release.version).yellow()
    ));
    if opts.keep {
        display::warn("Resources were left in the cluster (--keep)");
    }
    println!(
        "History is kept; reinstall with `rudder install {} <chart>` or restore with `rudder rollback {}`",
        release.name, release.name
    );
    Ok(())
}
