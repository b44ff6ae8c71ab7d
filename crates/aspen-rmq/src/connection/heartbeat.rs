//! Lease renewal task.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::warn;

use crate::constants::HEARTBEAT_VALUE;
use crate::store::ListStore;
use crate::store::StoreError;

/// Renews one connection's heartbeat lease until told to stop.
pub(crate) struct Heartbeat<S: ListStore + ?Sized> {
    pub(crate) store: Arc<S>,
    pub(crate) connection: String,
    pub(crate) key: String,
    pub(crate) ttl: Duration,
    pub(crate) interval: Duration,
    pub(crate) stopped: Arc<AtomicBool>,
    /// Held across the stop check and the write, and by `stop_heartbeat`
    /// across setting the flag and deleting the lease.
    pub(crate) lease: Arc<tokio::sync::Mutex<()>>,
}

impl<S: ListStore + ?Sized + 'static> Heartbeat<S> {
    /// Write the lease once with a fresh TTL.
    pub(crate) async fn renew(&self) -> Result<(), StoreError> {
        self.store.set_with_expiry(&self.key, HEARTBEAT_VALUE, self.ttl).await
    }

    /// Renew every `interval` until the stop flag is set.
    ///
    /// Failures are logged and the loop keeps going; a long enough run of them
    /// lets the lease lapse, and a peer then recovers this connection. The
    /// lease is not deleted on exit.
    pub(crate) async fn run(self) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let _lease = self.lease.lock().await;
            if self.stopped.load(Ordering::SeqCst) {
                debug!(connection = %self.connection, "heartbeat stopped");
                return;
            }

            match self.renew().await {
                Ok(()) => debug!(connection = %self.connection, "heartbeat renewed"),
                Err(e) => warn!(connection = %self.connection, error = %e, "failed to renew heartbeat"),
            }
        }
    }
}
