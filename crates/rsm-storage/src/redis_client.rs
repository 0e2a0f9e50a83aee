//! Redis-backed storage client.

use std::time::Duration;

use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{Client, Cmd, RedisError};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::StorageClient;
use crate::error::{Result, StorageError};

/// Connection and response timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Connection settings for [`RedisStorageClient`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://:password@host:6379/0`.
    pub url: String,

    /// Connection and per-command response timeout.
    pub timeout: Duration,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the timeout. A zero duration selects [`DEFAULT_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        self
    }
}

/// [`StorageClient`] over Redis.
///
/// All callers share one multiplexed connection that reconnects on failure.
/// Create-if-absent is a single `SET ... NX [EX ttl]` command, so the claim
/// and its expiry are applied atomically.
pub struct RedisStorageClient {
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisStorageClient {
    /// Connect to the configured server.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StorageError::InvalidUrl(e.to_string()))?;

        info!(
            addr = %client.get_connection_info().addr,
            timeout_ms = config.timeout.as_millis() as u64,
            "Connecting to Redis"
        );

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.timeout)
            .set_response_timeout(config.timeout);

        let conn = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| failed("connect", e))?;

        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.conn.read().await.clone().ok_or(StorageError::Closed)
    }

    async fn query<T: ::redis::FromRedisValue>(&self, operation: &'static str, cmd: Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| failed(operation, e))
    }
}

fn failed(operation: &'static str, err: RedisError) -> StorageError {
    warn!(operation, error = %err, "Redis command failed");
    StorageError::transport(operation, err)
}

/// `SET key payload [NX] [EX ttl]`.
fn set_cmd(key: &str, payload: &[u8], ttl_secs: u64, only_if_absent: bool) -> Cmd {
    let mut cmd = ::redis::cmd("SET");
    cmd.arg(key).arg(payload);
    if only_if_absent {
        cmd.arg("NX");
    }
    if ttl_secs > 0 {
        cmd.arg("EX").arg(ttl_secs);
    }
    cmd
}

#[async_trait]
impl StorageClient for RedisStorageClient {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        ttl_secs: u64,
        payload: &[u8],
    ) -> Result<bool> {
        debug!(key = %key, ttl_secs, "set_if_absent");
        // Nil reply means the key already existed.
        let reply: Option<String> = self
            .query("set_if_absent", set_cmd(key, payload, ttl_secs, true))
            .await?;
        Ok(reply.is_some())
    }

    async fn set_if_absent(&self, key: &str, payload: &[u8]) -> Result<bool> {
        debug!(key = %key, "set_if_absent");
        let reply: Option<String> = self
            .query("set_if_absent", set_cmd(key, payload, 0, true))
            .await?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, ttl_secs: u64, payload: &[u8]) -> Result<bool> {
        debug!(key = %key, ttl_secs, "set");
        let reply: String = self
            .query("set", set_cmd(key, payload, ttl_secs, false))
            .await?;
        Ok(reply == "OK")
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!(key = %key, "get");
        let mut cmd = ::redis::cmd("GET");
        cmd.arg(key);
        self.query("get", cmd).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        debug!(key = %key, ttl_secs, "expire");
        let cmd = if ttl_secs > 0 {
            let mut cmd = ::redis::cmd("EXPIRE");
            cmd.arg(key).arg(ttl_secs);
            cmd
        } else {
            let mut cmd = ::redis::cmd("PERSIST");
            cmd.arg(key);
            cmd
        };
        let updated: i64 = self.query("expire", cmd).await?;
        // PERSIST answers 0 for a key that exists without a TTL.
        if updated == 0 && ttl_secs == 0 {
            let mut exists = ::redis::cmd("EXISTS");
            exists.arg(key);
            let count: i64 = self.query("expire", exists).await?;
            return Ok(count > 0);
        }
        Ok(updated > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        debug!(key = %key, "delete");
        let mut cmd = ::redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.query("delete", cmd).await?;
        Ok(removed > 0)
    }

    async fn close(&self) {
        if self.conn.write().await.take().is_some() {
            info!("Redis connection closed");
        }
    }
}
