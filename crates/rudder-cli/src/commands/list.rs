//! List command - latest revision of every release

use clap::Args;
use rudder_kube::{ListFilter, Status};

use super::manager;
use crate::config::Settings;
use crate::display;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct ListArgs {
    /// List releases in every namespace
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Only releases with this status (e.g. deployed, failed, pending-upgrade)
    #[arg(long, value_parser = parse_status)]
    pub status: Option<Status>,

    /// Only releases whose name contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_status(s: &str) -> std::result::Result<Status, String> {
    Status::parse(s).ok_or_else(|| format!("unknown status '{}'", s))
}

pub async fn run(settings: &Settings, args: &ListArgs) -> Result<()> {
    let manager = manager(settings).await?;
    let namespace = (!args.all_namespaces).then_some(settings.namespace.as_str());
    let filter = ListFilter {
        status: args.status,
        name_contains: args.filter.clone(),
    };
    let releases = manager.list(namespace, &filter).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&releases)?);
        return Ok(());
    }

    if releases.is_empty() {
        println!("No releases found");
        return Ok(());
    }
    display::print_table(display::LIST_HEADERS, &display::list_rows(&releases));
    Ok(())
}
