//! Crash recovery and lease behavior across several connections sharing one
//! in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use aspen_rmq::Cleaner;
use aspen_rmq::Connection;
use aspen_rmq::Consumer;
use aspen_rmq::Delivery;
use aspen_rmq::DeterministicListStore;
use aspen_rmq::ListStore;
use aspen_rmq::keys;

type Store = DeterministicListStore;

async fn open(tag: &str, store: &Arc<Store>) -> Connection<Store> {
    let connection = Connection::open(tag, store.clone()).await.unwrap();
    // The scanner runs once as soon as it starts; let it.
    tokio::task::yield_now().await;
    connection
}

async fn ready(store: &Arc<Store>, queue: &str) -> Vec<String> {
    store.list_range(&keys::ready_key(queue), 0, -1).await.unwrap()
}

/// Simulates a crash: drop every handle, then make the lease lapse at once.
async fn kill(connection: Connection<Store>, store: &Arc<Store>) -> String {
    let name = connection.name().to_string();
    drop(connection);
    store.expire(&keys::heartbeat_key(&name)).await;
    name
}

#[tokio::test]
async fn test_connection_names_are_unique() {
    let store = DeterministicListStore::new();
    let mut names = HashSet::new();
    let mut connections = Vec::new();
    for _ in 0..50 {
        let connection = open("worker", &store).await;
        assert!(names.insert(connection.name().to_string()));
        connections.push(connection);
    }

    let registered: HashSet<_> = connections[0].connections().await.unwrap().into_iter().collect();
    assert_eq!(registered, names);
}

#[tokio::test(start_paused = true)]
async fn test_running_connection_stays_alive_and_lapses_after_drop() {
    let store = DeterministicListStore::new();
    let connection = Connection::open("worker", store.clone()).await.unwrap();
    let name = connection.name().to_string();
    let observer = Cleaner::new(store.clone());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(observer.is_alive(&name).await.unwrap());

    // The last renewal landed within the final second before the drop.
    drop(connection);
    tokio::time::sleep(Duration::from_secs(58)).await;
    assert!(observer.is_alive(&name).await.unwrap());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!observer.is_alive(&name).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_background_scan_recovers_dropped_peer() {
    let store = DeterministicListStore::new();
    let survivor = Connection::open("survivor", store.clone()).await.unwrap();
    let doomed = Connection::open("doomed", store.clone()).await.unwrap();
    let doomed_name = doomed.name().to_string();

    let queue = doomed.open_queue("jobs").await.unwrap();
    queue.publish("m1").await.unwrap();
    queue.take(1).await.unwrap();
    drop(queue);
    drop(doomed);

    // Lease runs out after 60s; the survivor's next scan lands by 120s.
    tokio::time::sleep(Duration::from_secs(125)).await;

    assert_eq!(ready(&store, "jobs").await, vec!["m1"]);
    assert_eq!(survivor.connections().await.unwrap(), vec![survivor.name().to_string()]);
    assert!(!store.contains(&keys::unacked_key(&doomed_name, "jobs")).await);
}

#[tokio::test]
async fn test_no_message_loss_after_crash() {
    let store = DeterministicListStore::new();
    let survivor = open("survivor", &store).await;
    let doomed = open("doomed", &store).await;

    let queue = doomed.open_queue("jobs").await.unwrap();
    let payloads: Vec<String> = (0..25).map(|i| format!("job-{i}")).collect();
    for payload in &payloads {
        queue.publish(payload).await.unwrap();
    }
    assert_eq!(queue.take(25).await.unwrap().len(), 25);
    drop(queue);
    let doomed_name = kill(doomed, &store).await;

    survivor.cleaner().scan_once().await.unwrap();

    assert_eq!(ready(&store, "jobs").await, payloads);
    assert!(!store.contains(&keys::unacked_key(&doomed_name, "jobs")).await);
    assert!(!survivor.connections().await.unwrap().contains(&doomed_name));
}

#[tokio::test]
async fn test_recovery_is_idempotent() {
    let store = DeterministicListStore::new();
    let survivor = open("survivor", &store).await;
    let doomed = open("doomed", &store).await;

    let queue = doomed.open_queue("jobs").await.unwrap();
    for payload in ["m1", "m2", "m3"] {
        queue.publish(payload).await.unwrap();
    }
    queue.take(3).await.unwrap();
    drop(queue);
    let doomed_name = kill(doomed, &store).await;

    let first = Cleaner::new(store.clone());
    let second = Cleaner::new(store.clone());
    let (a, b) = tokio::join!(first.recover_connection(&doomed_name), second.recover_connection(&doomed_name));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.moved + b.moved, 3);

    let again = survivor.cleaner().recover_connection(&doomed_name).await.unwrap();
    assert_eq!(again.moved, 0);
    assert!(again.is_complete);

    assert_eq!(ready(&store, "jobs").await, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn test_acked_messages_are_not_redelivered() {
    let store = DeterministicListStore::new();
    let survivor = open("survivor", &store).await;
    let doomed = open("doomed", &store).await;

    let queue = doomed.open_queue("jobs").await.unwrap();
    for payload in ["m1", "m2", "m3"] {
        queue.publish(payload).await.unwrap();
    }
    let deliveries = queue.take(3).await.unwrap();
    assert!(deliveries[0].ack().await.unwrap());
    assert!(deliveries[2].ack().await.unwrap());
    drop(deliveries);
    drop(queue);
    kill(doomed, &store).await;

    survivor.cleaner().scan_once().await.unwrap();
    assert_eq!(ready(&store, "jobs").await, vec!["m2"]);
}

#[tokio::test]
async fn test_reject_after_peer_recovery_does_not_duplicate() {
    let store = DeterministicListStore::new();
    let survivor = open("survivor", &store).await;
    let slow = open("slow", &store).await;

    let queue = slow.open_queue("jobs").await.unwrap();
    queue.publish("m1").await.unwrap();
    let delivery = queue.take(1).await.unwrap().pop().unwrap();
    store.expire(&keys::heartbeat_key(slow.name())).await;

    survivor.cleaner().scan_once().await.unwrap();
    assert_eq!(ready(&store, "jobs").await, vec!["m1"]);

    assert!(!delivery.reject().await.unwrap());
    assert_eq!(ready(&store, "jobs").await, vec!["m1"]);
}

#[tokio::test]
async fn test_live_connections_are_left_alone() {
    let store = DeterministicListStore::new();
    let a = open("a", &store).await;
    let b = open("b", &store).await;

    let queue = b.open_queue("jobs").await.unwrap();
    queue.publish("m1").await.unwrap();
    queue.take(1).await.unwrap();

    let report = a.cleaner().scan_once().await.unwrap();
    assert_eq!(report.checked, 2);
    assert!(report.recovered.is_empty());
    assert_eq!(queue.unacked_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_stop_heartbeat_hands_messages_to_peers() {
    let store = DeterministicListStore::new();
    let a = open("a", &store).await;
    let b = open("b", &store).await;

    let queue = b.open_queue("jobs").await.unwrap();
    queue.publish("m1").await.unwrap();
    queue.take(1).await.unwrap();
    b.stop_heartbeat().await.unwrap();

    let report = a.cleaner().scan_once().await.unwrap();
    assert_eq!(report.recovered.len(), 1);
    assert_eq!(report.recovered[0].connection, b.name());
    assert_eq!(report.recovered[0].moved, 1);
    assert_eq!(ready(&store, "jobs").await, vec!["m1"]);
}

#[tokio::test]
async fn test_jobs_end_to_end() {
    let store = DeterministicListStore::new();
    let a = open("a", &store).await;
    let jobs = a.open_queue("jobs").await.unwrap();
    for payload in ["m1", "m2", "m3"] {
        jobs.publish(payload).await.unwrap();
    }
    assert_eq!(jobs.ready_count().await.unwrap(), 3);

    let b = open("b", &store).await;
    let b_jobs = b.open_queue("jobs").await.unwrap();
    b_jobs.take(3).await.unwrap();
    store.set_add(&keys::consumers_key(b.name(), "jobs"), "b-consumer").await.unwrap();
    assert_eq!(jobs.ready_count().await.unwrap(), 0);
    assert_eq!(b_jobs.unacked_count().await.unwrap(), 3);
    drop(b_jobs);
    let b_name = kill(b, &store).await;

    a.cleaner().scan_once().await.unwrap();

    assert_eq!(ready(&store, "jobs").await, vec!["m1", "m2", "m3"]);
    assert!(!a.connections().await.unwrap().contains(&b_name));
    assert!(!store.contains(&keys::unacked_key(&b_name, "jobs")).await);
    assert!(!store.contains(&keys::consumers_key(&b_name, "jobs")).await);
    assert!(!store.contains(&keys::connection_queues_key(&b_name)).await);
}

struct Hoarder(Arc<Mutex<Vec<String>>>);

#[async_trait::async_trait]
impl Consumer<Store> for Hoarder {
    async fn consume(&self, delivery: Delivery<Store>) {
        // Takes the message and never acknowledges it.
        self.0.lock().unwrap().push(delivery.into_payload());
    }
}

#[tokio::test]
async fn test_messages_held_by_crashed_consumer_are_recovered() {
    let store = DeterministicListStore::new();
    let a = open("a", &store).await;
    let b = open("b", &store).await;

    let producer = a.open_queue("jobs").await.unwrap();
    for payload in ["m1", "m2", "m3", "m4"] {
        producer.publish(payload).await.unwrap();
    }

    let held = Arc::new(Mutex::new(Vec::new()));
    let mut consumer_queue = b.open_queue("jobs").await.unwrap();
    consumer_queue.start_consuming(2, Duration::from_millis(5)).await.unwrap();
    consumer_queue.add_consumer("hoarder", Hoarder(held.clone())).await.unwrap();

    for _ in 0..200 {
        if producer.ready_count().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    consumer_queue.stop_consuming().await;
    assert_eq!(consumer_queue.unacked_count().await.unwrap(), 4);
    drop(consumer_queue);
    kill(b, &store).await;

    a.cleaner().scan_once().await.unwrap();
    assert_eq!(ready(&store, "jobs").await, vec!["m1", "m2", "m3", "m4"]);
}
