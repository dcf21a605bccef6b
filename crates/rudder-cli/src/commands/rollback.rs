//! Rollback command - redeploy an earlier version as a new revision

use clap::Args;
use console::style;
use rudder_kube::RollbackOptions;

use super::{TransitionFlags, manager};
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Release name
    pub name: String,

    /// Revision to restore; defaults to the previous good one
    pub revision: Option<u32>,

    #[command(flatten)]
    pub flags: TransitionFlags,
}

pub async fn run(settings: &Settings, args: &RollbackArgs) -> Result<()> {
    let opts = RollbackOptions {
        version: args.revision.unwrap_or(0),
        wait: args.flags.wait,
        timeout: args.flags.timeout(settings)?,
        disable_hooks: args.flags.no_hooks,
        dry_run: args.flags.dry_run,
        description: args.flags.description.clone(),
        max_history: args.flags.max_history(settings),
        ..RollbackOptions::new(&args.name, &settings.namespace)
    };

    match args.revision {
        Some(v) => display::step(format!(
            "Rolling back {} to revision {}",
            style(&args.name).cyan(),
            style(v).yellow()
        )),
        None => display::step(format!(
            "Rolling back {} to the previous revision",
            style(&args.name).cyan()
        )),
    }

    let manager = manager(settings).await?;
    let spinner = (!opts.dry_run).then(|| display::spinner("Rolling back..."));
    let result = manager.rollback(&opts).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let release = result?;

    if opts.dry_run {
        display::success(format!(
            "Dry run: would create revision {} ({})",
            style(release.version).yellow(),
            release.info.description
        ));
    } else {
        display::success(format!(
            "Rolled back {}: revision {} ({})",
            style(&release.name).cyan(),
            style(release.version).yellow(),
            release.info.description
        ));
    }
    Ok(())
}
