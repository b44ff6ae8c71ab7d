//! Minimal capability surface over the backing store.
//!
//! Everything above this module is built from these primitives and nothing
//! else: expiring string keys, sets, and lists with an atomic
//! pop-front/push-back move. Implementations must allow concurrent use from
//! many tasks, since a connection's renewal task, scanner, and foreground
//! caller all share one store handle.

mod inmemory;
#[cfg(feature = "redis")]
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
pub use inmemory::DeterministicListStore;
use snafu::Snafu;

#[cfg(feature = "redis")]
pub use redis_store::RedisListStore;

/// Errors reported by a [`ListStore`] implementation.
///
/// "Not found", "no TTL" and "empty list" are not errors; they come back as
/// `None`, `0` or an empty collection.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The backend rejected or failed the command.
    #[snafu(display("store backend error: {reason}"))]
    Backend {
        /// Backend-provided description.
        reason: String,
    },

    /// The key holds a value of a different type than the command expects.
    #[snafu(display("wrong type for key '{key}': expected {expected}"))]
    WrongType {
        /// Offending key.
        key: String,
        /// Type the command operates on.
        expected: &'static str,
    },

    /// The command did not complete in time.
    #[snafu(display("store operation timed out after {duration_ms}ms"))]
    Timeout {
        /// Elapsed time before giving up.
        duration_ms: u64,
    },
}

/// Store primitives required by connections, queues, and recovery.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remaining time to live of `key`.
    ///
    /// `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Delete `key`, returning how many keys were removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;

    /// Add `member` to the set at `key`. Returns true if it was not present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove `member` from the set at `key`. Returns true if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// All members of the set at `key`, empty if the key is missing.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Length of the list at `key`, 0 if the key is missing.
    async fn list_len(&self, key: &str) -> Result<u64, StoreError>;

    /// Append `value` to the back of the list at `key`. Returns the new length.
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Atomically pop the front of `source` and push it to the back of
    /// `destination`.
    ///
    /// The element is never observable in both lists or in neither. Returns
    /// `None` when `source` is empty.
    async fn list_move(&self, source: &str, destination: &str) -> Result<Option<String>, StoreError>;

    /// Remove up to `count` occurrences of `value` from the list at `key`,
    /// scanning from the front. Returns how many were removed.
    async fn list_remove(&self, key: &str, count: u64, value: &str) -> Result<u64, StoreError>;

    /// Elements of the list at `key` from `start` to `stop` inclusive.
    /// Negative indexes count from the back, as in Redis.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: ListStore + ?Sized> ListStore for std::sync::Arc<T> {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set_with_expiry(key, value, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        (**self).ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        (**self).delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        (**self).set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        (**self).set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).set_members(key).await
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        (**self).list_len(key).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        (**self).list_push(key, value).await
    }

    async fn list_move(&self, source: &str, destination: &str) -> Result<Option<String>, StoreError> {
        (**self).list_move(source, destination).await
    }

    async fn list_remove(&self, key: &str, count: u64, value: &str) -> Result<u64, StoreError> {
        (**self).list_remove(key, count, value).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        (**self).list_range(key, start, stop).await
    }
}
