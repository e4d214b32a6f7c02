//! Mosaic CLI - Command line tool for Mosaic fragment registries.
//!
//! Commands:
//! - `mosaic routes` - List the route table
//! - `mosaic match` - Resolve a URL to a route
//! - `mosaic diff` - Show slot changes between two URLs
//! - `mosaic simulate` - Replay a navigation against stub fragments

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{DiffArgs, MatchArgs, RoutesArgs, SimulateArgs};

/// Mosaic CLI - Inspect and simulate micro-frontend registries
#[derive(Parser)]
#[command(name = "mosaic")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Registry file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the route table
    Routes(RoutesArgs),

    /// Resolve a URL to a route
    Match(MatchArgs),

    /// Show how slots change when navigating between two URLs
    Diff(DiffArgs),

    /// Replay a navigation sequence against stub fragments
    Simulate(SimulateArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = output::Output::new(cli.verbose, cli.json);

    let ctx = match context::Context::load(cli.config.as_deref(), output.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Routes(args) => commands::routes::run(args, &ctx).await,
        Commands::Match(args) => commands::resolve::run(args, &ctx).await,
        Commands::Diff(args) => commands::diff::run(args, &ctx).await,
        Commands::Simulate(args) => commands::simulate::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
