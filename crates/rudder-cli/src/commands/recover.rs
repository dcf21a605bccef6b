//! Recover command - clear a release stuck in a pending status

use clap::Args;
use console::style;

use super::manager;
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct RecoverArgs {
    /// Release name
    pub name: String,
}

pub async fn run(settings: &Settings, args: &RecoverArgs) -> Result<()> {
    display::step(format!(
        "Attempting to recover release {}",
        style(&args.name).cyan()
    ));

    let manager = manager(settings).await?;
    let release = manager.recover(&settings.namespace, &args.name).await?;

    display::success(format!(
        "Recovered {} (revision {} is now {})",
        style(&release.name).cyan(),
        style(release.version).yellow(),
        display::status_style(release.status())
    ));
    println!("\nYou can now retry the operation:");
    println!("  rudder upgrade {} <chart>", release.name);
    Ok(())
}
