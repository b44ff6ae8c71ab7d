//! Key schema for the backing store.
//!
//! Every participant derives the same keys from the same names, so these
//! templates are the wire format of the protocol. They are pure string
//! functions and never touch the store.
//!
//! | Purpose                          | Key                                          |
//! |----------------------------------|----------------------------------------------|
//! | connection registry              | `connections`                                |
//! | queue registry                   | `queues`                                     |
//! | heartbeat lease                  | `connection:{connection}:heartbeat`          |
//! | queues consumed by a connection  | `connection:{connection}:queues`             |
//! | unacknowledged list              | `connection:{connection}:queue:[{queue}]:unacked`   |
//! | consumers set                    | `connection:{connection}:queue:[{queue}]:consumers` |
//! | ready list                       | `queue:[{queue}]:ready`                      |

/// Set of all registered connection names.
pub const CONNECTIONS_KEY: &str = "connections";

/// Set of all queue names ever opened.
pub const QUEUES_KEY: &str = "queues";

const CONNECTION_PREFIX: &str = "connection:";
const QUEUE_PREFIX: &str = "queue:";

/// Heartbeat lease of a connection.
pub fn heartbeat_key(connection: &str) -> String {
    format!("{CONNECTION_PREFIX}{connection}:heartbeat")
}

/// Set of queue names a connection is consuming.
pub fn connection_queues_key(connection: &str) -> String {
    format!("{CONNECTION_PREFIX}{connection}:queues")
}

/// Unacknowledged list for one connection and queue.
pub fn unacked_key(connection: &str, queue: &str) -> String {
    format!("{CONNECTION_PREFIX}{connection}:queue:[{queue}]:unacked")
}

/// Consumers set for one connection and queue.
pub fn consumers_key(connection: &str, queue: &str) -> String {
    format!("{CONNECTION_PREFIX}{connection}:queue:[{queue}]:consumers")
}

/// Ready list of a queue.
pub fn ready_key(queue: &str) -> String {
    format!("{QUEUE_PREFIX}[{queue}]:ready")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_registry_keys() {
        assert_eq!(CONNECTIONS_KEY, "connections");
        assert_eq!(QUEUES_KEY, "queues");
    }

    #[test]
    fn test_heartbeat_key() {
        assert_eq!(heartbeat_key("worker-ab12CD"), "connection:worker-ab12CD:heartbeat");
        assert_eq!(heartbeat_key(""), "connection::heartbeat");
    }

    #[test]
    fn test_connection_queues_key() {
        assert_eq!(connection_queues_key("worker-ab12CD"), "connection:worker-ab12CD:queues");
    }

    #[test]
    fn test_unacked_key() {
        assert_eq!(unacked_key("worker-ab12CD", "jobs"), "connection:worker-ab12CD:queue:[jobs]:unacked");
        assert_eq!(unacked_key("c", ""), "connection:c:queue:[]:unacked");
    }

    #[test]
    fn test_consumers_key() {
        assert_eq!(consumers_key("worker-ab12CD", "jobs"), "connection:worker-ab12CD:queue:[jobs]:consumers");
    }

    #[test]
    fn test_ready_key() {
        assert_eq!(ready_key("jobs"), "queue:[jobs]:ready");
        assert_eq!(ready_key("a:b"), "queue:[a:b]:ready");
    }

    #[test]
    fn test_names_with_separators_are_embedded_verbatim() {
        assert_eq!(unacked_key("a:b", "c]d"), "connection:a:b:queue:[c]d]:unacked");
        assert_eq!(ready_key("[x]"), "queue:[[x]]:ready");
    }

    proptest! {
        #[test]
        fn prop_connection_keys_are_distinct(conn in "[a-zA-Z0-9-]{1,20}", queue in "[a-z0-9_]{1,12}") {
            let keys = [
                heartbeat_key(&conn),
                connection_queues_key(&conn),
                unacked_key(&conn, &queue),
                consumers_key(&conn, &queue),
                ready_key(&queue),
            ];
            for (i, a) in keys.iter().enumerate() {
                for b in keys.iter().skip(i + 1) {
                    prop_assert_ne!(a, b);
                }
            }
        }

        #[test]
        fn prop_distinct_connections_never_share_keys(a in "[a-z]{1,8}-[a-zA-Z0-9]{6}", b in "[a-z]{1,8}-[a-zA-Z0-9]{6}") {
            prop_assume!(a != b);
            prop_assert_ne!(heartbeat_key(&a), heartbeat_key(&b));
            prop_assert_ne!(unacked_key(&a, "q"), unacked_key(&b, "q"));
        }
    }
}
