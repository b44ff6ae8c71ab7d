//! Connection registry commands.

use anyhow::Result;
use clap::Args;
use clap::Subcommand;

use crate::cli::RmqConnection;
use crate::output::CheckOutput;
use crate::output::ConnectionEntry;
use crate::output::ConnectionListOutput;
use crate::output::ScanOutput;
use crate::output::print_output;

/// Registered connections and recovery.
#[derive(Subcommand)]
pub enum ConnectionCommand {
    /// List registered connections with their liveness.
    List,

    /// Check whether one connection's heartbeat is live.
    Check(CheckArgs),

    /// Run one recovery scan now instead of waiting for a peer's.
    Recover,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Connection name, e.g. `worker-a1B2c3`.
    pub name: String,
}

impl ConnectionCommand {
    /// Execute the connection command.
    pub async fn run(self, connection: &RmqConnection, json: bool) -> Result<()> {
        match self {
            ConnectionCommand::List => connection_list(connection, json).await,
            ConnectionCommand::Check(args) => connection_check(connection, args, json).await,
            ConnectionCommand::Recover => connection_recover(connection, json).await,
        }
    }
}

async fn connection_list(connection: &RmqConnection, json: bool) -> Result<()> {
    let mut connections = Vec::new();
    for name in connection.connections().await? {
        let is_alive = connection.is_alive(&name).await?;
        connections.push(ConnectionEntry {
            is_self: name == connection.name(),
            name,
            is_alive,
        });
    }

    print_output(&ConnectionListOutput { connections }, json);
    Ok(())
}

async fn connection_check(connection: &RmqConnection, args: CheckArgs, json: bool) -> Result<()> {
    let peer = connection.hijack(&args.name);
    let is_alive = peer.check().await?;
    let is_registered = connection.connections().await?.contains(&args.name);

    print_output(
        &CheckOutput {
            name: args.name,
            is_registered,
            is_alive,
        },
        json,
    );
    Ok(())
}

async fn connection_recover(connection: &RmqConnection, json: bool) -> Result<()> {
    let report = connection.cleaner().scan_once().await?;
    print_output(&ScanOutput { report }, json);
    Ok(())
}
