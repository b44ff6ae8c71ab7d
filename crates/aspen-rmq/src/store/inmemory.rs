//! In-memory implementation of [`ListStore`] for tests and simulation.
//!
//! Mirrors Redis semantics closely enough for the protocol: expired keys read
//! as missing, empty lists and sets disappear, and type mismatches are errors.
//! Expiry uses `tokio::time::Instant`, so tests running on a paused clock see
//! leases lapse exactly when the clock is advanced past them.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::ListStore;
use super::StoreError;

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// A deterministic in-memory store.
///
/// Thread-safe; every operation takes one lock, which makes each primitive
/// atomic in the same way a single Redis command is.
#[derive(Debug, Default)]
pub struct DeterministicListStore {
    data: Mutex<HashMap<String, Entry>>,
    failing: AtomicBool,
}

impl DeterministicListStore {
    /// Create a new store wrapped in `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent operation fail (or succeed again).
    ///
    /// Used to exercise the fatal and tolerated failure paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Force `key` to expire now. Returns false if it did not exist.
    pub async fn expire(&self, key: &str) -> bool {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        purge_if_expired(&mut data, key, now);
        match data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Whether `key` currently exists.
    pub async fn contains(&self, key: &str) -> bool {
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        data.contains_key(key)
    }

    /// String value stored at `key`, if any.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        match data.get(key).map(|entry| &entry.value) {
            Some(Value::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn check_failing(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn purge_if_expired(data: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if data.get(key).is_some_and(|entry| entry.is_expired(now)) {
        data.remove(key);
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn list_mut<'a>(data: &'a mut HashMap<String, Entry>, key: &str) -> Result<&'a mut VecDeque<String>, StoreError> {
    let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
        value: Value::List(VecDeque::new()),
        expires_at: None,
    });
    match &mut entry.value {
        Value::List(list) => Ok(list),
        _ => Err(wrong_type(key, "list")),
    }
}

fn remove_if_empty(data: &mut HashMap<String, Entry>, key: &str) {
    let is_empty = match data.get(key).map(|entry| &entry.value) {
        Some(Value::List(list)) => list.is_empty(),
        Some(Value::Set(set)) => set.is_empty(),
        _ => false,
    };
    if is_empty {
        data.remove(key);
    }
}

/// Resolve a Redis-style inclusive index range against a list length.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl ListStore for DeterministicListStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), Entry {
            value: Value::String(value.to_string()),
            expires_at: Some(Instant::now() + ttl),
        });
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        let now = Instant::now();
        purge_if_expired(&mut data, key, now);
        Ok(data
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero()))
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        Ok(u64::from(data.remove(key).is_some()))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key, "set")),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        let removed = match data.get_mut(key).map(|entry| &mut entry.value) {
            None => false,
            Some(Value::Set(set)) => set.remove(member),
            Some(_) => return Err(wrong_type(key, "set")),
        };
        remove_if_empty(&mut data, key);
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        match data.get(key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        match data.get(key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        let list = list_mut(&mut data, key)?;
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    async fn list_move(&self, source: &str, destination: &str) -> Result<Option<String>, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        let now = Instant::now();
        purge_if_expired(&mut data, source, now);
        purge_if_expired(&mut data, destination, now);

        match data.get(destination).map(|entry| &entry.value) {
            None | Some(Value::List(_)) => {}
            Some(_) => return Err(wrong_type(destination, "list")),
        }
        let element = match data.get_mut(source).map(|entry| &mut entry.value) {
            None => return Ok(None),
            Some(Value::List(list)) => list.pop_front(),
            Some(_) => return Err(wrong_type(source, "list")),
        };
        let Some(element) = element else {
            return Ok(None);
        };
        remove_if_empty(&mut data, source);
        list_mut(&mut data, destination)?.push_back(element.clone());
        Ok(Some(element))
    }

    async fn list_remove(&self, key: &str, count: u64, value: &str) -> Result<u64, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        let list = match data.get_mut(key).map(|entry| &mut entry.value) {
            None => return Ok(0),
            Some(Value::List(list)) => list,
            Some(_) => return Err(wrong_type(key, "list")),
        };
        let limit = if count == 0 { u64::MAX } else { count };
        let mut removed = 0u64;
        list.retain(|element| {
            if removed < limit && element == value {
                removed += 1;
                false
            } else {
                true
            }
        });
        remove_if_empty(&mut data, key);
        Ok(removed)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.check_failing()?;
        let mut data = self.data.lock().await;
        purge_if_expired(&mut data, key, Instant::now());
        let list = match data.get(key).map(|entry| &entry.value) {
            None => return Ok(Vec::new()),
            Some(Value::List(list)) => list,
            Some(_) => return Err(wrong_type(key, "list")),
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_counts_down_and_expires() {
        let store = DeterministicListStore::new();
        store.set_with_expiry("lease", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.ttl("lease").await.unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(store.get("lease").await.as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.ttl("lease").await.unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.ttl("lease").await.unwrap(), None);
        assert!(!store.contains("lease").await);
    }

    #[tokio::test]
    async fn test_ttl_missing_and_persistent_keys() {
        let store = DeterministicListStore::new();
        assert_eq!(store.ttl("missing").await.unwrap(), None);
        store.list_push("list", "a").await.unwrap();
        assert_eq!(store.ttl("list").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expire_forces_lapse() {
        let store = DeterministicListStore::new();
        store.set_with_expiry("lease", "1", Duration::from_secs(60)).await.unwrap();
        assert!(store.expire("lease").await);
        assert_eq!(store.ttl("lease").await.unwrap(), None);
        assert!(!store.expire("lease").await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = DeterministicListStore::new();
        store.list_push("l", "a").await.unwrap();
        assert_eq!(store.delete("l").await.unwrap(), 1);
        assert_eq!(store.delete("l").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = DeterministicListStore::new();
        assert!(store.set_add("s", "b").await.unwrap());
        assert!(store.set_add("s", "a").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), vec!["a", "b"]);
        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(!store.set_remove("s", "a").await.unwrap());
        assert!(store.set_remove("s", "b").await.unwrap());
        assert!(!store.contains("s").await);
    }

    #[tokio::test]
    async fn test_list_move_is_fifo_and_removes_empty_source() {
        let store = DeterministicListStore::new();
        for v in ["m1", "m2"] {
            store.list_push("src", v).await.unwrap();
        }
        assert_eq!(store.list_move("src", "dst").await.unwrap().as_deref(), Some("m1"));
        assert_eq!(store.list_move("src", "dst").await.unwrap().as_deref(), Some("m2"));
        assert_eq!(store.list_move("src", "dst").await.unwrap(), None);
        assert!(!store.contains("src").await);
        assert_eq!(store.list_range("dst", 0, -1).await.unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_list_remove_counts() {
        let store = DeterministicListStore::new();
        for v in ["a", "b", "a", "a"] {
            store.list_push("l", v).await.unwrap();
        }
        assert_eq!(store.list_remove("l", 1, "a").await.unwrap(), 1);
        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["b", "a", "a"]);
        assert_eq!(store.list_remove("l", 0, "a").await.unwrap(), 2);
        assert_eq!(store.list_remove("l", 0, "zzz").await.unwrap(), 0);
        assert_eq!(store.list_len("l").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_range_indexes() {
        let store = DeterministicListStore::new();
        for v in ["a", "b", "c"] {
            store.list_push("l", v).await.unwrap();
        }
        assert_eq!(store.list_range("l", 0, 0).await.unwrap(), vec!["a"]);
        assert_eq!(store.list_range("l", -2, -1).await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.list_range("l", 1, 100).await.unwrap(), vec!["b", "c"]);
        assert!(store.list_range("l", 3, 5).await.unwrap().is_empty());
        assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let store = DeterministicListStore::new();
        store.set_add("s", "a").await.unwrap();
        let err = store.list_push("s", "x").await.unwrap_err();
        assert_eq!(err, StoreError::WrongType {
            key: "s".to_string(),
            expected: "list",
        });
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = DeterministicListStore::new();
        store.set_failing(true);
        assert!(store.list_len("l").await.is_err());
        store.set_failing(false);
        assert_eq!(store.list_len("l").await.unwrap(), 0);
    }
}
