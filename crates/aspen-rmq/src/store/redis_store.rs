//! Redis-backed [`ListStore`].
//!
//! Uses a multiplexed [`ConnectionManager`], which reconnects on its own and
//! is cheap to clone, so each call clones the handle instead of locking it.
//!
//! **Requires Redis 6.2 or later** for `LMOVE`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::Cmd;
use redis::FromRedisValue;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::ListStore;
use super::StoreError;

/// Default per-command timeout.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// [`ListStore`] over a Redis server.
#[derive(Clone)]
pub struct RedisListStore {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisListStore")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisListStore {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let manager = client.get_connection_manager().await.map_err(backend)?;
        debug!(url, "redis connection manager ready");
        Ok(Self::from_manager(manager))
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn query<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T, StoreError> {
        let mut conn = self.manager.clone();
        with_timeout(self.command_timeout, async move { cmd.query_async(&mut conn).await }).await
    }
}

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend {
        reason: err.to_string(),
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = redis::RedisResult<T>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(backend),
        Err(_) => Err(StoreError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }),
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(ttl.as_millis() as u64);
        self.query::<()>(cmd).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        // -2: missing, -1: no expiry.
        let millis: i64 = self.query(cmd).await?;
        Ok((millis > 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        let added: u64 = self.query(cmd).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(member);
        let removed: u64 = self.query(cmd).await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key).arg(value);
        self.query(cmd).await
    }

    async fn list_move(&self, source: &str, destination: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("LMOVE");
        cmd.arg(source).arg(destination).arg("LEFT").arg("RIGHT");
        self.query(cmd).await
    }

    async fn list_remove(&self, key: &str, count: u64, value: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("LREM");
        cmd.arg(key).arg(count).arg(value);
        self.query(cmd).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.query(cmd).await
    }
}
