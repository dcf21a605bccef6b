//! Status command - show one revision of a release

use clap::Args;
use console::style;

use super::manager;
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Release name
    pub name: String,

    /// Revision to show (defaults to the latest)
    #[arg(long)]
    pub revision: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the computed values
    #[arg(long)]
    pub show_values: bool,

    /// Show the rendered manifest
    #[arg(long)]
    pub show_manifest: bool,
}

pub async fn run(settings: &Settings, args: &StatusArgs) -> Result<()> {
    let manager = manager(settings).await?;
    let release = manager
        .status(&settings.namespace, &args.name, args.revision)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&release)?);
        return Ok(());
    }

    display::print_release_info(&release);
    display::print_hooks(&release.hooks);

    if args.show_values {
        println!("\n{}", style("VALUES:").bold());
        print!("{}", release.values.to_yaml()?);
    }
    if args.show_manifest {
        println!("\n{}", style("MANIFEST:").bold());
        println!("{}", release.manifest.trim_end());
    }
    display::print_notes(&release);
    Ok(())
}
