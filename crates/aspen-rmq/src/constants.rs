//! Protocol constants shared by every participant.
//!
//! Peers running against the same store must agree on these values; changing
//! the lease duration on one side only shortens or stretches the window in
//! which the other side considers it alive.

use std::time::Duration;

/// How long a heartbeat lease survives without renewal.
pub const HEARTBEAT_TTL: Duration = Duration::from_secs(60);

/// How often the owning connection renews its lease.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// How often each connection scans the registry for dead peers.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Sentinel stored under a heartbeat key. Only existence and TTL matter.
pub const HEARTBEAT_VALUE: &str = "1";

/// Length of the random suffix appended to connection and consumer tags.
pub const NAME_SUFFIX_LEN: usize = 6;

/// Default number of deliveries buffered per consuming queue.
pub const DEFAULT_PREFETCH_LIMIT: usize = 10;

/// Default delay between ready-list polls when the buffer has room.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on deliveries moved by a single `take` call.
pub(crate) const MAX_TAKE_BATCH: usize = 1024;
