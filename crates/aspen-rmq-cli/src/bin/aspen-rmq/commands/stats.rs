//! Stats command.

use anyhow::Result;
use clap::Args;

use crate::cli::RmqConnection;
use crate::output::StatsOutput;
use crate::output::print_output;

#[derive(Args)]
pub struct StatsArgs {
    /// Queues to report on. Defaults to every registered queue.
    pub queues: Vec<String>,
}

impl StatsArgs {
    /// Execute the stats command.
    pub async fn run(self, connection: &RmqConnection, json: bool) -> Result<()> {
        let queues = if self.queues.is_empty() {
            connection.open_queues().await?
        } else {
            self.queues
        };

        let stats = connection.collect_stats(&queues).await?;
        print_output(&StatsOutput { stats }, json);
        Ok(())
    }
}
