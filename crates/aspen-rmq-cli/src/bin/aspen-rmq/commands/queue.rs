//! Queue commands.
//!
//! Publishing here goes through the same ready list workers consume from,
//! so it is also a quick way to inject test messages.

use anyhow::Result;
use clap::Args;
use clap::Subcommand;

use crate::cli::RmqConnection;
use crate::output::QueueListOutput;
use crate::output::print_output;
use crate::output::print_success;

/// Queue registry, publishing, and purging.
#[derive(Subcommand)]
pub enum QueueCommand {
    /// List every queue ever opened.
    List,

    /// Publish a message to a queue.
    Publish(PublishArgs),

    /// Delete every ready message in a queue.
    Purge(PurgeArgs),

    /// Forget the queue registry. Messages are untouched.
    CloseAll,
}

#[derive(Args)]
pub struct PublishArgs {
    /// Queue name.
    pub queue: String,

    /// Message payload.
    pub payload: String,
}

#[derive(Args)]
pub struct PurgeArgs {
    /// Queue name.
    pub queue: String,
}

impl QueueCommand {
    /// Execute the queue command.
    pub async fn run(self, connection: &RmqConnection, json: bool) -> Result<()> {
        match self {
            QueueCommand::List => queue_list(connection, json).await,
            QueueCommand::Publish(args) => queue_publish(connection, args, json).await,
            QueueCommand::Purge(args) => queue_purge(connection, args, json).await,
            QueueCommand::CloseAll => queue_close_all(connection, json).await,
        }
    }
}

async fn queue_list(connection: &RmqConnection, json: bool) -> Result<()> {
    let queues = connection.open_queues().await?;
    print_output(&QueueListOutput { queues }, json);
    Ok(())
}

async fn queue_publish(connection: &RmqConnection, args: PublishArgs, json: bool) -> Result<()> {
    let queue = connection.open_queue(&args.queue).await?;
    queue.publish(&args.payload).await?;
    print_success(&format!("published to {}", args.queue), json);
    Ok(())
}

async fn queue_purge(connection: &RmqConnection, args: PurgeArgs, json: bool) -> Result<()> {
    let queue = connection.open_queue(&args.queue).await?;
    let count = queue.ready_count().await?;
    if queue.purge_ready().await? {
        print_success(&format!("purged {} ready message(s) from {}", count, args.queue), json);
    } else {
        print_success(&format!("{} has no ready messages", args.queue), json);
    }
    Ok(())
}

async fn queue_close_all(connection: &RmqConnection, json: bool) -> Result<()> {
    let deleted = connection.close_all_queues().await?;
    let message = if deleted > 0 { "queue registry cleared" } else { "queue registry was already empty" };
    print_success(message, json);
    Ok(())
}
