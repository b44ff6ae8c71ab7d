//! Queues: publishing, taking, and the unacknowledged-list bookkeeping that
//! recovery relies on.
//!
//! A queue has one shared ready list. Each connection that consumes from it
//! gets its own unacknowledged list and consumers set, so a crashed
//! connection's in-flight messages can be found and returned by name.
//!
//! Messages move ready → unacked with one atomic store operation, and leave
//! unacked only by acknowledgement, rejection, or recovery. At no point is a
//! taken message absent from both lists.

mod consume;
mod delivery;

use std::sync::Arc;

pub use consume::Consumer;
use consume::Consuming;
pub use delivery::Delivery;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::constants::MAX_TAKE_BATCH;
use crate::error::Result;
use crate::keys;
use crate::store::ListStore;

/// Result of draining one list into another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Elements moved.
    pub moved: u64,
    /// Moves that failed; the elements stay in the source list.
    pub failed: u64,
}

/// Move every element of `source` to the back of `destination`, front first.
///
/// The length is read once up front, so elements pushed during the drain are
/// left for the next one. A source emptied early by a concurrent drain just
/// ends this one. Failures are logged and counted, never returned: a failed
/// length read counts as one failure so callers never mistake an unreadable
/// list for an empty one.
pub(crate) async fn drain_list<S: ListStore + ?Sized>(store: &S, source: &str, destination: &str) -> DrainOutcome {
    let mut outcome = DrainOutcome::default();

    let len = match store.list_len(source).await {
        Ok(len) => len,
        Err(e) => {
            error!(source, error = %e, "failed to read list length");
            outcome.failed = 1;
            return outcome;
        }
    };

    for _ in 0..len {
        match store.list_move(source, destination).await {
            Ok(Some(_)) => outcome.moved += 1,
            Ok(None) => break,
            Err(e) => {
                error!(source, destination, error = %e, "failed to move list element");
                outcome.failed += 1;
            }
        }
    }

    outcome
}

/// A named queue as seen from one connection.
pub struct Queue<S: ListStore + ?Sized> {
    name: String,
    connection: String,
    ready_key: String,
    unacked_key: String,
    consumers_key: String,
    connection_queues_key: String,
    store: Arc<S>,
    consuming: Option<Consuming<S>>,
}

impl<S: ListStore + ?Sized> std::fmt::Debug for Queue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .field("consuming", &self.consuming.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: ListStore + ?Sized> std::fmt::Display for Queue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] conn:{}", self.name, self.connection)
    }
}

impl<S: ListStore + ?Sized + 'static> Queue<S> {
    pub(crate) fn new(name: &str, connection: &str, store: Arc<S>) -> Self {
        Self {
            name: name.to_string(),
            connection: connection.to_string(),
            ready_key: keys::ready_key(name),
            unacked_key: keys::unacked_key(connection, name),
            consumers_key: keys::consumers_key(connection, name),
            connection_queues_key: keys::connection_queues_key(connection),
            store,
            consuming: None,
        }
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the connection this handle belongs to.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Append `payload` to the back of the ready list.
    pub async fn publish(&self, payload: &str) -> Result<()> {
        self.store.list_push(&self.ready_key, payload).await?;
        debug!(queue = %self.name, "message published");
        Ok(())
    }

    /// Move up to `count` messages from the ready list into this connection's
    /// unacknowledged list and hand them out.
    ///
    /// Registers the queue under the connection first, so recovery can find
    /// the messages even if the process dies right after the move. Returns
    /// fewer deliveries when the ready list runs dry.
    pub async fn take(&self, count: usize) -> Result<Vec<Delivery<S>>> {
        let count = count.min(MAX_TAKE_BATCH);
        if count == 0 {
            return Ok(Vec::new());
        }

        self.register_in_connection().await?;

        let mut deliveries = Vec::with_capacity(count);
        for _ in 0..count {
            match self.store.list_move(&self.ready_key, &self.unacked_key).await? {
                Some(payload) => deliveries.push(self.delivery(payload)),
                None => break,
            }
        }

        debug!(queue = %self.name, connection = %self.connection, count = deliveries.len(), "messages taken");
        Ok(deliveries)
    }

    /// Number of messages waiting in the ready list.
    pub async fn ready_count(&self) -> Result<u64> {
        Ok(self.store.list_len(&self.ready_key).await?)
    }

    /// Number of messages this connection has taken but not acknowledged.
    pub async fn unacked_count(&self) -> Result<u64> {
        Ok(self.store.list_len(&self.unacked_key).await?)
    }

    /// Consumer names registered for this queue on this connection.
    pub async fn consumers(&self) -> Result<Vec<String>> {
        Ok(self.store.set_members(&self.consumers_key).await?)
    }

    /// Delete the ready list. Returns whether it existed.
    pub async fn purge_ready(&self) -> Result<bool> {
        let deleted = self.store.delete(&self.ready_key).await?;
        if deleted > 0 {
            warn!(queue = %self.name, "ready list purged");
        }
        Ok(deleted > 0)
    }

    /// Move every unacknowledged message of this connection back to ready.
    pub async fn return_all_unacked(&self) -> DrainOutcome {
        let outcome = drain_list(self.store.as_ref(), &self.unacked_key, &self.ready_key).await;
        debug!(queue = %self.name, moved = outcome.moved, failed = outcome.failed, "unacked messages returned");
        outcome
    }

    /// Detach this queue from the connection.
    ///
    /// Returns unacknowledged messages to ready first. The bookkeeping keys
    /// are removed only when every move succeeded; otherwise they stay for
    /// recovery to retry.
    pub async fn close_in_connection(&self) -> Result<DrainOutcome> {
        let outcome = self.return_all_unacked().await;
        if outcome.failed > 0 {
            warn!(
                queue = %self.name,
                connection = %self.connection,
                failed = outcome.failed,
                "unacked messages left in place, keeping queue registered"
            );
            return Ok(outcome);
        }

        self.store.delete(&self.unacked_key).await?;
        self.store.delete(&self.consumers_key).await?;
        self.store.set_remove(&self.connection_queues_key, &self.name).await?;
        Ok(outcome)
    }

    async fn register_in_connection(&self) -> Result<()> {
        self.store.set_add(&self.connection_queues_key, &self.name).await?;
        Ok(())
    }

    fn delivery(&self, payload: String) -> Delivery<S> {
        Delivery::new(payload, self.unacked_key.clone(), self.ready_key.clone(), self.store.clone())
    }
}
