//! Install command - deploy a chart as a new release

use clap::Args;
use console::style;
use rudder_core::LoadedChart;
use rudder_kube::{InstallOptions, Release};
use std::path::PathBuf;

use super::{TransitionFlags, ValuesArgs, labels, manager};
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Release name
    pub name: String,

    /// Chart directory
    pub chart: PathBuf,

    #[command(flatten)]
    pub values: ValuesArgs,

    #[command(flatten)]
    pub flags: TransitionFlags,

    /// Label to attach to the release (key=value)
    #[arg(long = "label")]
    pub labels: Vec<String>,
}

pub async fn run(settings: &Settings, args: &InstallArgs) -> Result<()> {
    let chart = LoadedChart::load(&args.chart)?;
    display::step(format!(
        "Installing chart {} version {} as {}",
        style(&chart.metadata.name).cyan(),
        style(&chart.metadata.version).yellow(),
        style(&args.name).cyan()
    ));

    let values = args.values.load()?;
    let opts = InstallOptions {
        wait: args.flags.wait,
        timeout: args.flags.timeout(settings)?,
        disable_hooks: args.flags.no_hooks,
        dry_run: args.flags.dry_run,
        description: args.flags.description.clone(),
        labels: labels(&args.labels)?,
        max_history: args.flags.max_history(settings),
        ..InstallOptions::new(&args.name, &settings.namespace)
    };

    let manager = manager(settings).await?;
    let spinner = (!opts.dry_run).then(|| display::spinner("Installing..."));
    let result = manager.install(&chart, values, &opts).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let release = result?;

    if opts.dry_run {
        print_dry_run(&release);
    } else {
        display::success(format!(
            "Installed {} (revision {}) in namespace {}",
            style(&release.name).cyan(),
            style(release.version).yellow(),
            style(&release.namespace).yellow()
        ));
    }
    display::print_notes(&release);
    Ok(())
}

/// Manifest and hooks an install or upgrade would apply
pub(crate) fn print_dry_run(release: &Release) {
    println!("{}", style("MANIFEST:").bold());
    println!("{}", release.manifest.trim_end());
    if !release.hooks.is_empty() {
        println!("\n{}", style("HOOKS:").bold());
        for hook in &release.hooks {
            println!("---\n# Source: {}\n{}", hook.path, hook.manifest.trim_end());
        }
    }
    display::success(format!(
        "Dry run: {} revision {} in namespace {} was not applied",
        style(&release.name).cyan(),
        style(release.version).yellow(),
        style(&release.namespace).yellow()
    ));
}
