//! Diff command - compare the manifests of two revisions

use clap::Args;
use console::style;

use super::manager;
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Release name
    pub name: String,

    /// Older revision
    pub from: u32,

    /// Newer revision
    pub to: u32,

    /// Only list changed resources
    #[arg(long)]
    pub summary: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(settings: &Settings, args: &DiffArgs) -> Result<()> {
    let manager = manager(settings).await?;
    let diff = manager
        .diff(&settings.namespace, &args.name, args.from, args.to)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    println!(
        "{} revision {} -> {}\n",
        style(&args.name).cyan(),
        style(diff.from).yellow(),
        style(diff.to).yellow()
    );
    display::print_diff(&diff, !args.summary);
    Ok(())
}
