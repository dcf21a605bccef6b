//! Hidden `__complete` command used by shell completion scripts

use clap::Args;
use rudder_kube::{ListFilter, Release};
use tracing::debug;

use super::manager;
use crate::completion::{CompletionContext, CompletionRegistry};
use crate::config::Settings;
use crate::error::Result;

#[derive(Debug, Args)]
pub struct CompleteArgs {
    /// Command being completed (e.g. upgrade)
    pub command: String,

    /// Argument being completed (name, namespace, status)
    pub arg: String,

    /// Text typed so far
    #[arg(default_value = "")]
    pub prefix: String,
}

/// Print one candidate per line; store errors produce no candidates
pub async fn run(
    settings: &Settings,
    namespace: Option<&str>,
    registry: &CompletionRegistry,
    args: &CompleteArgs,
) -> Result<()> {
    let mut ctx = CompletionContext {
        namespace: namespace.map(str::to_string),
        releases: Vec::new(),
    };

    if registry.needs_releases(&args.command, &args.arg) {
        match stored_releases(settings).await {
            Ok(releases) => ctx.releases = releases,
            Err(e) => debug!(error = %e, "completion could not read releases"),
        }
    }

    for candidate in registry.complete(&ctx, &args.command, &args.arg, &args.prefix) {
        println!("{}", candidate);
    }
    Ok(())
}

async fn stored_releases(settings: &Settings) -> Result<Vec<Release>> {
    let manager = manager(settings).await?;
    Ok(manager.list(None, &ListFilter::default()).await?)
}
