//! History command - show every revision of a release

use clap::Args;
use console::style;

use super::manager;
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Release name
    pub name: String,

    /// Show only the most recent revisions
    #[arg(long)]
    pub max: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(settings: &Settings, args: &HistoryArgs) -> Result<()> {
    let manager = manager(settings).await?;
    let mut history = manager.history(&settings.namespace, &args.name).await?;

    if let Some(max) = args.max {
        let skip = history.len().saturating_sub(max);
        history.drain(..skip);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!(
        "Release history for {} in namespace {}:\n",
        style(&args.name).cyan(),
        style(&settings.namespace).yellow()
    );
    display::print_table(display::HISTORY_HEADERS, &display::history_rows(&history));
    Ok(())
}
