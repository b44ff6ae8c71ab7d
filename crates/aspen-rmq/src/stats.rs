//! Read-only snapshot of queues, connections, and their backlogs.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::connection::Connection;
use crate::error::Result;
use crate::store::ListStore;

/// One connection's view of one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Whether the connection's lease is live.
    pub is_active: bool,
    /// Messages taken but not yet acknowledged.
    pub unacked_count: u64,
    /// Registered consumer names.
    pub consumers: Vec<String>,
}

/// Backlog of one queue across all connections consuming it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Messages waiting in the ready list.
    pub ready_count: u64,
    /// Per-connection state, keyed by connection name.
    pub connections: BTreeMap<String, ConnectionStats>,
}

impl QueueStats {
    /// Unacknowledged messages summed over every connection.
    pub fn unacked_count(&self) -> u64 {
        self.connections.values().map(|c| c.unacked_count).sum()
    }

    /// Consumers summed over every connection.
    pub fn consumer_count(&self) -> usize {
        self.connections.values().map(|c| c.consumers.len()).sum()
    }
}

/// Snapshot keyed by queue name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Per-queue stats.
    pub queues: BTreeMap<String, QueueStats>,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:>8} {:>8} {:>10}", "QUEUE", "READY", "UNACKED", "CONSUMERS")?;
        for (name, queue) in &self.queues {
            writeln!(
                f,
                "{:<24} {:>8} {:>8} {:>10}",
                name,
                queue.ready_count,
                queue.unacked_count(),
                queue.consumer_count()
            )?;
            for (connection, stats) in &queue.connections {
                let state = if stats.is_active { "active" } else { "inactive" };
                writeln!(
                    f,
                    "  {:<22} {:>8} {:>8} {:>10}  {}",
                    connection,
                    "",
                    stats.unacked_count,
                    stats.consumers.len(),
                    state
                )?;
            }
        }
        Ok(())
    }
}

/// Collect stats for `queues` by walking every registered connection.
///
/// Connections that consume none of the requested queues do not appear.
/// Values are read one at a time, so the snapshot is not atomic.
pub async fn collect_stats<S: ListStore + ?Sized + 'static>(
    connection: &Connection<S>,
    queues: &[String],
) -> Result<Stats> {
    let mut stats = Stats::default();
    for name in queues {
        let ready_count = connection.queue_handle(name).ready_count().await?;
        stats.queues.insert(name.clone(), QueueStats {
            ready_count,
            connections: BTreeMap::new(),
        });
    }

    for peer_name in connection.connections().await? {
        let peer = connection.hijack(&peer_name);
        let is_active = peer.check().await?;

        for queue_name in peer.consuming_queues().await? {
            let Some(queue_stats) = stats.queues.get_mut(&queue_name) else {
                continue;
            };
            let queue = peer.queue_handle(&queue_name);
            queue_stats.connections.insert(peer_name.clone(), ConnectionStats {
                is_active,
                unacked_count: queue.unacked_count().await?,
                consumers: queue.consumers().await?,
            });
        }
    }

    Ok(stats)
}
