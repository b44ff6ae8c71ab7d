//! A taken message awaiting acknowledgement.

use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::store::ListStore;

/// One message sitting in a connection's unacknowledged list.
///
/// Dropping a delivery without acking or rejecting leaves it unacknowledged;
/// it is returned to ready when the connection's queue is closed or when a
/// peer recovers the connection.
pub struct Delivery<S: ListStore + ?Sized> {
    payload: String,
    unacked_key: String,
    ready_key: String,
    store: Arc<S>,
}

impl<S: ListStore + ?Sized> std::fmt::Debug for Delivery<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload", &self.payload)
            .field("unacked_key", &self.unacked_key)
            .finish_non_exhaustive()
    }
}

impl<S: ListStore + ?Sized> Delivery<S> {
    pub(crate) fn new(payload: String, unacked_key: String, ready_key: String, store: Arc<S>) -> Self {
        Self {
            payload,
            unacked_key,
            ready_key,
            store,
        }
    }

    /// The message body.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Consume the delivery, keeping only the body.
    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Remove the message from the unacknowledged list.
    ///
    /// Returns false if it was no longer there, e.g. because a peer already
    /// recovered this connection.
    pub async fn ack(&self) -> Result<bool> {
        let removed = self.store.list_remove(&self.unacked_key, 1, &self.payload).await?;
        if removed == 0 {
            warn!(key = %self.unacked_key, "ack: message not found in unacked list");
        }
        Ok(removed > 0)
    }

    /// Put the message back on the ready list for redelivery.
    ///
    /// Only a message still in the unacknowledged list is requeued. If a peer
    /// already recovered it, it is back in ready and this returns false.
    pub async fn reject(&self) -> Result<bool> {
        let removed = self.store.list_remove(&self.unacked_key, 1, &self.payload).await?;
        if removed == 0 {
            warn!(key = %self.unacked_key, "reject: message not found in unacked list");
            return Ok(false);
        }
        self.store.list_push(&self.ready_key, &self.payload).await?;
        debug!(key = %self.ready_key, "message rejected");
        Ok(true)
    }
}
