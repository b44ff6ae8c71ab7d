//! aspen-rmq - inspect and administer aspen-rmq queues.
//!
//! # Usage
//!
//! ```bash
//! # Which connections are registered, and which are alive
//! aspen-rmq --redis-url redis://127.0.0.1:6379/0 connection list
//!
//! # Publish and inspect
//! aspen-rmq queue publish jobs '{"id": 42}'
//! aspen-rmq stats jobs
//!
//! # Reclaim messages held by dead connections right now
//! aspen-rmq connection recover
//!
//! # JSON output for scripting
//! aspen-rmq --json stats | jq '.queues.jobs.ready_count'
//! ```

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all logging output (for scripting)
/// - `verbose`: Enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.is_quiet, cli.global.is_verbose);

    cli.run().await
}
