//! CLI command implementations.

pub mod diff;
pub mod resolve;
pub mod routes;
pub mod simulate;

use clap::Args;

/// Arguments for the routes command.
#[derive(Args)]
pub struct RoutesArgs {
    /// Include special routes (e.g. 404).
    #[arg(short, long)]
    pub special: bool,
}

/// Arguments for the match command.
#[derive(Args)]
pub struct MatchArgs {
    /// URL to resolve.
    pub url: String,

    /// Resolve the special route with this role instead (e.g. 404).
    #[arg(long)]
    pub special: Option<String>,
}

/// Arguments for the diff command.
#[derive(Args)]
pub struct DiffArgs {
    /// URL the page is on.
    pub from: String,

    /// URL being navigated to.
    pub to: String,
}

/// Arguments for the simulate command.
#[derive(Args)]
pub struct SimulateArgs {
    /// Initial URL followed by the URLs to navigate to, in order.
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Applications whose mount should fail.
    #[arg(long = "fail")]
    pub failing: Vec<String>,
}
