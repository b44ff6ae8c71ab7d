//! Error types for connections, queues, and deliveries.

use snafu::Snafu;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors surfaced to foreground callers.
///
/// Background tasks never return these; they log and keep going.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RmqError {
    /// The initial heartbeat lease could not be written.
    ///
    /// A connection that cannot prove liveness is never registered.
    #[snafu(display("connection '{connection}' failed to set its initial heartbeat: {source}"))]
    HeartbeatFailed {
        /// Name the connection would have used.
        connection: String,
        /// Store failure behind it.
        source: StoreError,
    },

    /// `start_consuming` was called twice on the same queue handle.
    #[snafu(display("queue '{queue}' is already consuming"))]
    AlreadyConsuming {
        /// Queue name.
        queue: String,
    },

    /// A consumer was added before `start_consuming`.
    #[snafu(display("queue '{queue}' is not consuming"))]
    NotConsuming {
        /// Queue name.
        queue: String,
    },

    /// Prefetch limit must allow at least one buffered delivery.
    #[snafu(display("invalid prefetch limit {limit} for queue '{queue}'"))]
    InvalidPrefetchLimit {
        /// Queue name.
        queue: String,
        /// Rejected value.
        limit: usize,
    },

    /// Connection timing was rejected before anything was written.
    #[snafu(display("invalid connection config: {source}"))]
    InvalidConfig {
        /// Validation failure.
        source: ConfigError,
    },

    /// Underlying store error.
    #[snafu(display("store error: {source}"))]
    Store {
        /// The underlying error.
        source: StoreError,
    },
}

impl From<StoreError> for RmqError {
    fn from(source: StoreError) -> Self {
        RmqError::Store { source }
    }
}

/// Convenience alias used across the crate.
pub type Result<T, E = RmqError> = std::result::Result<T, E>;
