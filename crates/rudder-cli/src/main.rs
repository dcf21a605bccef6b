//! Rudder CLI - release lifecycle manager for Kubernetes charts

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod completion;
mod config;
mod display;
mod error;
mod exit_codes;

use commands::completion::CompleteArgs;
use commands::diff::DiffArgs;
use commands::history::HistoryArgs;
use commands::install::InstallArgs;
use commands::list::ListArgs;
use commands::recover::RecoverArgs;
use commands::rollback::RollbackArgs;
use commands::status::StatusArgs;
use commands::uninstall::UninstallArgs;
use commands::upgrade::UpgradeArgs;
use completion::CompletionRegistry;
use config::{DriverKind, Settings};
use error::Result;

#[derive(Parser)]
#[command(name = "rudder")]
#[command(version)]
#[command(about = "Release lifecycle manager for Kubernetes charts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Namespace of the release (defaults to the configured namespace)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Where release records are stored
    #[arg(long, global = true, value_enum)]
    driver: Option<DriverKind>,

    /// Config file (defaults to <config dir>/rudder/config.yaml)
    #[arg(long, global = true, env = "RUDDER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a chart as a new release
    Install(InstallArgs),

    /// Upgrade a deployed release
    Upgrade(UpgradeArgs),

    /// Roll a release back to an earlier revision
    Rollback(RollbackArgs),

    /// Uninstall a release, keeping its history
    Uninstall(UninstallArgs),

    /// Show release history
    History(HistoryArgs),

    /// Show a release revision
    Status(StatusArgs),

    /// List releases
    #[command(alias = "ls")]
    List(ListArgs),

    /// Mark a release stuck in a pending state as failed
    Recover(RecoverArgs),

    /// Compare two revisions of a release
    Diff(DiffArgs),

    #[command(name = "__complete", hide = true)]
    Complete(CompleteArgs),
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let registry = CompletionRegistry::builtin();
    if let Err(err) = run(cli, &registry).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli, registry: &CompletionRegistry) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(ns) = &cli.namespace {
        settings.namespace = ns.clone();
    }
    if let Some(driver) = cli.driver {
        settings.driver = driver;
    }
    tracing::debug!(?settings, "resolved settings");

    match &cli.command {
        Commands::Install(args) => commands::install::run(&settings, args).await,
        Commands::Upgrade(args) => commands::upgrade::run(&settings, args).await,
        Commands::Rollback(args) => commands::rollback::run(&settings, args).await,
        Commands::Uninstall(args) => commands::uninstall::run(&settings, args).await,
        Commands::History(args) => commands::history::run(&settings, args).await,
        Commands::Status(args) => commands::status::run(&settings, args).await,
        Commands::List(args) => commands::list::run(&settings, args).await,
        Commands::Recover(args) => commands::recover::run(&settings, args).await,
        Commands::Diff(args) => commands::diff::run(&settings, args).await,
        Commands::Complete(args) => {
            commands::completion::run(&settings, cli.namespace.as_deref(), registry, args).await
        }
    }
}

/// `RUST_LOG` wins; otherwise warn, or debug with `--debug`
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
