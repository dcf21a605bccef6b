//! Upgrade command - move a deployed release to a new chart or values

use clap::Args;
use console::style;
use rudder_core::LoadedChart;
use rudder_kube::UpgradeOptions;
use std::path::PathBuf;

use super::install::print_dry_run;
use super::{TransitionFlags, ValuesArgs, labels, manager};
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct UpgradeArgs {
    /// Release name
    pub name: String,

    /// Chart directory
    pub chart: PathBuf,

    #[command(flatten)]
    pub values: ValuesArgs,

    #[command(flatten)]
    pub flags: TransitionFlags,

    /// Start from the deployed release's values instead of chart defaults alone
    #[arg(long)]
    pub reuse_values: bool,

    /// Print the resource diff against the deployed release first
    #[arg(long)]
    pub show_diff: bool,

    /// Label to attach to the new version (key=value)
    #[arg(long = "label")]
    pub labels: Vec<String>,
}

pub async fn run(settings: &Settings, args: &UpgradeArgs) -> Result<()> {
    let chart = LoadedChart::load(&args.chart)?;
    display::step(format!(
        "Upgrading {} to chart {} version {}",
        style(&args.name).cyan(),
        style(&chart.metadata.name).cyan(),
        style(&chart.metadata.version).yellow()
    ));

    let values = args.values.load()?;
    let opts = UpgradeOptions {
        wait: args.flags.wait,
        timeout: args.flags.timeout(settings)?,
        disable_hooks: args.flags.no_hooks,
        reuse_values: args.reuse_values,
        dry_run: args.flags.dry_run,
        description: args.flags.description.clone(),
        labels: labels(&args.labels)?,
        max_history: args.flags.max_history(settings),
        ..UpgradeOptions::new(&args.name, &settings.namespace)
    };

    let manager = manager(settings).await?;

    if args.show_diff {
        let diff = manager.preview_upgrade(&chart, values.clone(), &opts).await?;
        display::print_diff(&diff, true);
        println!();
    }

    let spinner = (!opts.dry_run).then(|| display::spinner("Upgrading..."));
    let result = manager.upgrade(&chart, values, &opts).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let release = result?;

    if opts.dry_run {
        print_dry_run(&release);
    } else {
        display::success(format!(
            "Upgraded {} to revision {} in namespace {}",
            style(&release.name).cyan(),
            style(release.version).yellow(),
            style(&release.namespace).yellow()
        ));
    }
    display::print_notes(&release);
    Ok(())
}
