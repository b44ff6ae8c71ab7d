//! Connections: registration, heartbeat lease, and peer recovery.
//!
//! A connection represents one live process. Opening it writes a heartbeat
//! lease, registers the name, and starts two background tasks:
//!
//! - the heartbeat, renewing the lease every second
//! - the cleaner, scanning the registry every minute and reclaiming the
//!   unacknowledged messages of any peer whose lease has lapsed
//!
//! ```ignore
//! use aspen_rmq::{Connection, DeterministicListStore};
//!
//! let store = DeterministicListStore::new();
//! let connection = Connection::open("billing", store).await?;
//! let queue = connection.open_queue("invoices").await?;
//! queue.publish("invoice-42").await?;
//! ```

mod cleaner;
mod heartbeat;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

pub use cleaner::Cleaner;
pub use cleaner::RecoveryReport;
pub use cleaner::ScanReport;
use heartbeat::Heartbeat;
use rand::Rng;
use rand::distr::Alphanumeric;
use snafu::ResultExt;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::config::ConnectionConfig;
use crate::constants::NAME_SUFFIX_LEN;
use crate::error::HeartbeatFailedSnafu;
use crate::error::InvalidConfigSnafu;
use crate::error::Result;
use crate::keys;
use crate::queue::Queue;
use crate::stats::Stats;
use crate::stats::collect_stats;
use crate::store::ListStore;

/// `<tag>-<6 random alphanumerics>`.
pub(crate) fn unique_name(tag: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{tag}-{suffix}")
}

struct ConnectionInner<S: ListStore + ?Sized> {
    name: String,
    heartbeat_key: String,
    queues_key: String,
    store: Arc<S>,
    config: ConnectionConfig,
    heartbeat_stopped: Arc<AtomicBool>,
    lease: Arc<tokio::sync::Mutex<()>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: ListStore + ?Sized> Drop for ConnectionInner<S> {
    fn drop(&mut self) {
        let tasks = match self.tasks.get_mut() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Handle to one registered connection.
///
/// Cheap to clone. When the last clone is dropped, both background tasks are
/// aborted and the lease is left to expire, so peers eventually reclaim
/// whatever this connection had not acknowledged.
pub struct Connection<S: ListStore + ?Sized> {
    inner: Arc<ConnectionInner<S>>,
}

impl<S: ListStore + ?Sized> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ListStore + ?Sized> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.name)
            .field("heartbeat_stopped", &self.inner.heartbeat_stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<S: ListStore + ?Sized> std::fmt::Display for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl<S: ListStore + ?Sized + 'static> Connection<S> {
    /// Open a connection with the default lease and scan timing.
    pub async fn open(tag: &str, store: Arc<S>) -> Result<Self> {
        Self::open_with_config(tag, store, ConnectionConfig::default()).await
    }

    /// Open a connection named `<tag>-<random suffix>`.
    ///
    /// Fails with [`RmqError::HeartbeatFailed`](crate::RmqError::HeartbeatFailed)
    /// if the initial lease cannot be written; in that case nothing is
    /// registered and no task is started. The name joins the registry only
    /// after the lease exists, so no scanner can see it registered without
    /// one.
    pub async fn open_with_config(tag: &str, store: Arc<S>, config: ConnectionConfig) -> Result<Self> {
        config.validate().context(InvalidConfigSnafu)?;
        let connection = Self::detached(unique_name(tag), store, config);
        let heartbeat = connection.heartbeat();

        heartbeat.renew().await.context(HeartbeatFailedSnafu {
            connection: connection.name(),
        })?;

        connection.inner.store.set_add(keys::CONNECTIONS_KEY, connection.name()).await?;

        let heartbeat_task = tokio::spawn(heartbeat.run());
        let cleaner_task = tokio::spawn(connection.cleaner().run(connection.name().to_string(), config.scan_interval));
        connection.push_tasks([heartbeat_task, cleaner_task]);

        info!(connection = %connection, "connection opened");
        Ok(connection)
    }

    /// Handle for an existing connection name without a heartbeat or scanner.
    ///
    /// Used to inspect other connections, e.g. when collecting stats.
    pub fn hijack(&self, name: &str) -> Self {
        Self::detached(name.to_string(), self.inner.store.clone(), self.inner.config)
    }

    fn detached(name: String, store: Arc<S>, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                heartbeat_key: keys::heartbeat_key(&name),
                queues_key: keys::connection_queues_key(&name),
                name,
                store,
                config,
                heartbeat_stopped: Arc::new(AtomicBool::new(false)),
                lease: Arc::new(tokio::sync::Mutex::new(())),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    fn heartbeat(&self) -> Heartbeat<S> {
        Heartbeat {
            store: self.inner.store.clone(),
            connection: self.inner.name.clone(),
            key: self.inner.heartbeat_key.clone(),
            ttl: self.inner.config.heartbeat_ttl,
            interval: self.inner.config.heartbeat_interval,
            stopped: self.inner.heartbeat_stopped.clone(),
            lease: self.inner.lease.clone(),
        }
    }

    fn push_tasks(&self, handles: impl IntoIterator<Item = JoinHandle<()>>) {
        let mut tasks = match self.inner.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.extend(handles);
    }

    /// Globally unique connection name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The shared store handle.
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Timing this connection was opened with.
    pub fn config(&self) -> ConnectionConfig {
        self.inner.config
    }

    /// A cleaner sharing this connection's store.
    pub fn cleaner(&self) -> Cleaner<S> {
        Cleaner::new(self.inner.store.clone())
    }

    /// Open `name`, adding it to the global queue registry.
    pub async fn open_queue(&self, name: &str) -> Result<Queue<S>> {
        self.inner.store.set_add(keys::QUEUES_KEY, name).await?;
        Ok(self.queue_handle(name))
    }

    /// Queue handle bound to this connection, without touching the registry.
    pub(crate) fn queue_handle(&self, name: &str) -> Queue<S> {
        Queue::new(name, &self.inner.name, self.inner.store.clone())
    }

    /// All registered connection names, live or awaiting cleanup.
    pub async fn connections(&self) -> Result<Vec<String>> {
        Ok(self.inner.store.set_members(keys::CONNECTIONS_KEY).await?)
    }

    /// All queue names ever opened.
    pub async fn open_queues(&self) -> Result<Vec<String>> {
        Ok(self.inner.store.set_members(keys::QUEUES_KEY).await?)
    }

    /// Queues this connection is consuming.
    pub async fn consuming_queues(&self) -> Result<Vec<String>> {
        Ok(self.inner.store.set_members(&self.inner.queues_key).await?)
    }

    /// Whether this connection's own lease is live.
    pub async fn check(&self) -> Result<bool> {
        self.is_alive(&self.inner.name).await
    }

    /// Whether `connection` holds a lease with positive remaining TTL.
    pub async fn is_alive(&self, connection: &str) -> Result<bool> {
        self.cleaner().is_alive(connection).await
    }

    /// Whether [`stop_heartbeat`](Self::stop_heartbeat) has been called.
    pub fn is_heartbeat_stopped(&self) -> bool {
        self.inner.heartbeat_stopped.load(Ordering::SeqCst)
    }

    /// Stop renewing the lease and delete it now.
    ///
    /// The connection stays registered, so the next scanner to run treats it
    /// as dead and reclaims its unacknowledged messages. Returns whether the
    /// lease existed.
    ///
    /// Waits for a renewal already in flight, so the lease stays deleted.
    pub async fn stop_heartbeat(&self) -> Result<bool> {
        let _lease = self.inner.lease.lock().await;
        self.inner.heartbeat_stopped.store(true, Ordering::SeqCst);
        let deleted = self.inner.store.delete(&self.inner.heartbeat_key).await?;
        info!(connection = %self, "heartbeat stopped");
        Ok(deleted > 0)
    }

    /// Remove this connection from the registry.
    ///
    /// The lease is left to expire and no keys are deleted. Returns whether
    /// the name was registered.
    pub async fn close(&self) -> Result<bool> {
        let removed = self.inner.store.set_remove(keys::CONNECTIONS_KEY, &self.inner.name).await?;
        if !removed {
            warn!(connection = %self, "close: connection was not registered");
        }
        Ok(removed)
    }

    /// Drop the global queue registry. Returns the number of keys deleted.
    pub async fn close_all_queues(&self) -> Result<u64> {
        Ok(self.inner.store.delete(keys::QUEUES_KEY).await?)
    }

    /// Forget which queues this connection consumes.
    pub async fn close_all_queues_in_connection(&self) -> Result<()> {
        self.inner.store.delete(&self.inner.queues_key).await?;
        Ok(())
    }

    /// Snapshot of ready, unacknowledged, and consumer counts for `queues`.
    pub async fn collect_stats(&self, queues: &[String]) -> Result<Stats> {
        collect_stats(self, queues).await
    }
}
