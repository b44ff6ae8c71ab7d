//! Durable at-least-once message queue on a remote list/set store.
//!
//! Producers append messages to named queues. Consumers move them, one atomic
//! store operation at a time, into a per-connection unacknowledged list and
//! remove them on acknowledgement. Every process holds a [`Connection`] that
//! proves liveness with an expiring heartbeat key; every connection also scans
//! its peers and returns the unacknowledged messages of any whose heartbeat
//! has lapsed.
//!
//! - [`Connection`] - registration, heartbeat lease, peer recovery
//! - [`Queue`] - publish, take, push-style consumption
//! - [`Delivery`] - ack or reject one message
//! - [`Cleaner`] - one-shot scans and recovery, also used by the CLI
//! - [`ListStore`] - the store primitives everything is built from
//!
//! ## Example
//!
//! ```ignore
//! use aspen_rmq::{Connection, RedisListStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(RedisListStore::connect("redis://127.0.0.1:6379/0").await?);
//! let connection = Connection::open("billing", store).await?;
//!
//! let queue = connection.open_queue("invoices").await?;
//! queue.publish("invoice-42").await?;
//!
//! for delivery in queue.take(10).await? {
//!     handle(delivery.payload());
//!     delivery.ack().await?;
//! }
//! ```
//!
//! Delivery is at least once: a message whose consumer dies after finishing
//! the work but before acknowledging it is delivered again.

mod config;
mod connection;
pub mod constants;
mod error;
pub mod keys;
mod queue;
mod stats;
mod store;

pub use config::ConfigError;
pub use config::ConnectionConfig;
pub use config::RmqConfig;
pub use connection::Cleaner;
pub use connection::Connection;
pub use connection::RecoveryReport;
pub use connection::ScanReport;
pub use error::Result;
pub use error::RmqError;
pub use queue::Consumer;
pub use queue::Delivery;
pub use queue::DrainOutcome;
pub use queue::Queue;
pub use stats::ConnectionStats;
pub use stats::QueueStats;
pub use stats::Stats;
pub use stats::collect_stats;
pub use store::DeterministicListStore;
pub use store::ListStore;
#[cfg(feature = "redis")]
pub use store::RedisListStore;
pub use store::StoreError;
