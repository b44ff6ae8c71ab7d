//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definition with
//! support for environment variables and global options.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use aspen_rmq::Connection;
use aspen_rmq::RedisListStore;
use aspen_rmq::RmqConfig;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use tracing::warn;

use crate::commands::connection::ConnectionCommand;
use crate::commands::queue::QueueCommand;
use crate::commands::stats::StatsArgs;

/// Connection type used by every command.
pub type RmqConnection = Connection<RedisListStore>;

/// Inspect and administer aspen-rmq queues.
#[derive(Parser)]
#[command(name = "aspen-rmq")]
#[command(version)]
#[command(about = "Inspect and administer aspen-rmq queues")]
#[command(long_about = "Non-interactive CLI for listing connections and queues, publishing, \
    purging, collecting stats, and forcing recovery of dead connections.")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options for all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Redis server URL. Overrides the config file.
    #[arg(long, env = "RMQ_REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// TOML config file. Falls back to RMQ_* environment variables when absent.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format.
    #[arg(long = "json", global = true)]
    pub is_json: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub is_verbose: bool,

    /// Suppress all logging.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub is_quiet: bool,
}

/// Available command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Registered connections and recovery.
    #[command(subcommand)]
    Connection(ConnectionCommand),

    /// Queue registry, publishing, and purging.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Ready, unacked, and consumer counts per queue.
    Stats(StatsArgs),
}

impl Cli {
    /// Resolve configuration with flags taking precedence.
    pub fn config(&self) -> Result<RmqConfig> {
        let mut config =
            RmqConfig::load_with_optional_file(self.global.config.as_ref()).context("failed to load configuration")?;
        if let Some(url) = &self.global.redis_url {
            config.redis_url = url.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Execute the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = self.config()?;

        let store = RedisListStore::connect(&config.redis_url)
            .await
            .with_context(|| format!("failed to connect to {}", config.redis_url))?;
        let connection = Connection::open_with_config(&config.tag, Arc::new(store), config.connection_config())
            .await
            .context("failed to open connection")?;

        let result = match self.command {
            Commands::Connection(cmd) => cmd.run(&connection, self.global.is_json).await,
            Commands::Queue(cmd) => cmd.run(&connection, self.global.is_json).await,
            Commands::Stats(args) => args.run(&connection, self.global.is_json).await,
        };

        // Leave nothing behind for peers to recover.
        if let Err(e) = connection.close().await {
            warn!(error = %e, "failed to deregister cli connection");
        }
        if let Err(e) = connection.stop_heartbeat().await {
            warn!(error = %e, "failed to delete cli heartbeat");
        }

        result
    }
}
