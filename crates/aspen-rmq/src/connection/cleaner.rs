//! Peer-liveness scanning and crash recovery.
//!
//! Every open connection runs a scanner. There is no coordinator: whichever
//! scanner notices an expired lease first reclaims that peer's unacknowledged
//! messages. Each step is safe to run any number of times, so scanners racing
//! on the same dead peer converge on the same end state.
//!
//! Known race: two scanners can drain the same unacknowledged list at once.
//! Each snapshots the list length before moving, so one of them may find the
//! list empty before its count runs out. The atomic move guarantees no element
//! is moved twice; running out early just ends that drain.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::keys;
use crate::queue::DrainOutcome;
use crate::queue::drain_list;
use crate::store::ListStore;

/// Outcome of reclaiming one dead connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// The dead connection.
    pub connection: String,
    /// Queues it was consuming.
    pub queues: Vec<String>,
    /// Messages moved back to ready lists.
    pub moved: u64,
    /// Moves that failed and were left in place.
    pub failed: u64,
    /// Whether every bookkeeping key was removed and the connection left the
    /// registry. False when a failed move made deleting its lists unsafe; the
    /// next scan retries.
    pub is_complete: bool,
}

/// Outcome of one pass over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Registered connections inspected.
    pub checked: usize,
    /// Connections found dead and reclaimed.
    pub recovered: Vec<RecoveryReport>,
}

/// Scans the connection registry and reclaims dead peers.
pub struct Cleaner<S: ListStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ListStore + ?Sized> Clone for Cleaner<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ListStore + ?Sized + 'static> Cleaner<S> {
    /// Create a cleaner over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Whether `connection` holds a lease with positive remaining TTL.
    pub async fn is_alive(&self, connection: &str) -> Result<bool> {
        let ttl = self.store.ttl(&keys::heartbeat_key(connection)).await?;
        Ok(ttl.is_some())
    }

    /// One full pass: check every registered connection and reclaim the dead.
    ///
    /// Only a failure to read the registry is returned. Problems with a single
    /// connection are logged and the pass moves on.
    pub async fn scan_once(&self) -> Result<ScanReport> {
        let connections = self.store.set_members(keys::CONNECTIONS_KEY).await?;
        let mut report = ScanReport {
            checked: connections.len(),
            recovered: Vec::new(),
        };

        for connection in connections {
            match self.is_alive(&connection).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(connection, error = %e, "failed to check heartbeat, skipping");
                    continue;
                }
            }

            info!(connection, "connection heartbeat expired, recovering");
            match self.recover_connection(&connection).await {
                Ok(recovery) => report.recovered.push(recovery),
                Err(e) => error!(connection, error = %e, "failed to recover connection"),
            }
        }

        Ok(report)
    }

    /// Reclaim a dead connection: return its unacknowledged messages to their
    /// ready lists, delete its bookkeeping keys, and drop it from the registry.
    ///
    /// Does not check the lease; callers decide the connection is dead.
    pub async fn recover_connection(&self, connection: &str) -> Result<RecoveryReport> {
        let queues_key = keys::connection_queues_key(connection);
        let queues = self.store.set_members(&queues_key).await?;
        let mut report = RecoveryReport {
            connection: connection.to_string(),
            queues: queues.clone(),
            ..RecoveryReport::default()
        };

        for queue in &queues {
            let unacked_key = keys::unacked_key(connection, queue);
            let ready_key = keys::ready_key(queue);
            let DrainOutcome { moved, failed } = drain_list(self.store.as_ref(), &unacked_key, &ready_key).await;
            report.moved += moved;
            report.failed += failed;
            if moved > 0 {
                info!(connection, queue, moved, "returned unacked messages to ready");
            }
        }

        if report.failed > 0 {
            warn!(
                connection,
                failed = report.failed,
                "some unacked messages could not be moved, leaving connection for the next scan"
            );
            return Ok(report);
        }

        for queue in &queues {
            self.delete_logged(&keys::unacked_key(connection, queue)).await;
            self.delete_logged(&keys::consumers_key(connection, queue)).await;
        }
        self.delete_logged(&queues_key).await;

        self.store.set_remove(keys::CONNECTIONS_KEY, connection).await?;
        report.is_complete = true;
        info!(connection, moved = report.moved, "connection recovered and removed");
        Ok(report)
    }

    /// Scan every `interval` for as long as the task lives.
    pub(crate) async fn run(self, owner: String, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.scan_once().await {
                Ok(report) => debug!(
                    connection = %owner,
                    checked = report.checked,
                    recovered = report.recovered.len(),
                    "connection scan finished"
                ),
                Err(e) => error!(connection = %owner, error = %e, "connection scan failed"),
            }
        }
    }

    async fn delete_logged(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "failed to delete key during recovery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeterministicListStore;

    async fn seed_dead_connection(store: &DeterministicListStore, name: &str, queue: &str, payloads: &[&str]) {
        store.set_add(keys::CONNECTIONS_KEY, name).await.unwrap();
        store.set_add(&keys::connection_queues_key(name), queue).await.unwrap();
        store.set_add(&keys::consumers_key(name, queue), "worker-aaaaaa").await.unwrap();
        for payload in payloads {
            store.list_push(&keys::unacked_key(name, queue), payload).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_recover_connection_moves_and_tears_down() {
        let store = DeterministicListStore::new();
        seed_dead_connection(&store, "dead-000001", "jobs", &["m1", "m2"]).await;
        let cleaner = Cleaner::new(store.clone());

        let report = cleaner.recover_connection("dead-000001").await.unwrap();
        assert_eq!(report.moved, 2);
        assert_eq!(report.failed, 0);
        assert!(report.is_complete);
        assert_eq!(report.queues, vec!["jobs"]);

        assert_eq!(store.list_range(&keys::ready_key("jobs"), 0, -1).await.unwrap(), vec!["m1", "m2"]);
        assert!(!store.contains(&keys::unacked_key("dead-000001", "jobs")).await);
        assert!(!store.contains(&keys::consumers_key("dead-000001", "jobs")).await);
        assert!(!store.contains(&keys::connection_queues_key("dead-000001")).await);
        assert!(store.set_members(keys::CONNECTIONS_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_unknown_connection_is_a_noop() {
        let store = DeterministicListStore::new();
        let cleaner = Cleaner::new(store.clone());
        let report = cleaner.recover_connection("ghost-zzzzzz").await.unwrap();
        assert_eq!(report.moved, 0);
        assert!(report.queues.is_empty());
        assert!(report.is_complete);
    }

    #[tokio::test]
    async fn test_scan_skips_live_connections() {
        let store = DeterministicListStore::new();
        seed_dead_connection(&store, "live-000001", "jobs", &["m1"]).await;
        store
            .set_with_expiry(&keys::heartbeat_key("live-000001"), "1", Duration::from_secs(60))
            .await
            .unwrap();
        let cleaner = Cleaner::new(store.clone());

        let report = cleaner.scan_once().await.unwrap();
        assert_eq!(report.checked, 1);
        assert!(report.recovered.is_empty());
        assert_eq!(store.list_len(&keys::unacked_key("live-000001", "jobs")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_fails_only_when_registry_unreadable() {
        let store = DeterministicListStore::new();
        store.set_failing(true);
        let cleaner = Cleaner::new(store.clone());
        assert!(cleaner.scan_once().await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_typed_unacked_key_keeps_connection_registered() {
        let store = DeterministicListStore::new();
        store.set_add(keys::CONNECTIONS_KEY, "odd-000001").await.unwrap();
        store.set_add(&keys::connection_queues_key("odd-000001"), "jobs").await.unwrap();
        // A set where a list belongs makes every move fail.
        store.set_add(&keys::unacked_key("odd-000001", "jobs"), "x").await.unwrap();
        store.list_push(&keys::ready_key("jobs"), "m0").await.unwrap();

        let report = Cleaner::new(store.clone()).recover_connection("odd-000001").await.unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.failed, 1);
        assert!(!report.is_complete);
        assert_eq!(store.list_len(&keys::ready_key("jobs")).await.unwrap(), 1);
        assert_eq!(store.set_members(keys::CONNECTIONS_KEY).await.unwrap(), vec!["odd-000001"]);
        assert!(store.contains(&keys::connection_queues_key("odd-000001")).await);
    }
}
