//! In-process storage client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::client::StorageClient;
use crate::error::{Result, StorageError};
use crate::expiry::ExpiryTracker;

/// Writes between sweeps of expired keys.
const PURGE_INTERVAL: u32 = 64;

/// Inner state protected by a single lock, so conditional writes are atomic.
#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, Vec<u8>>,
    expiry: ExpiryTracker,
    writes_since_purge: u32,
}

impl MemoryInner {
    /// Drop `key` if its deadline has passed.
    fn evict_if_expired(&mut self, key: &str) {
        if self.expiry.is_expired(key) {
            trace!(key = %key, "Key expired");
            self.values.remove(key);
            self.expiry.remove(key);
        }
    }

    /// Store a value. Every [`PURGE_INTERVAL`] writes also sweeps keys that
    /// expired without being read again.
    fn put(&mut self, key: &str, ttl_secs: u64, payload: &[u8]) {
        self.values.insert(key.to_string(), payload.to_vec());
        self.expiry.set(key, ttl(ttl_secs));

        self.writes_since_purge += 1;
        if self.writes_since_purge >= PURGE_INTERVAL {
            self.purge();
        }
    }

    fn purge(&mut self) -> usize {
        self.writes_since_purge = 0;
        let expired = self.expiry.drain_expired();
        for key in &expired {
            self.values.remove(key);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired keys");
        }
        expired.len()
    }
}

fn ttl(ttl_secs: u64) -> Option<Duration> {
    (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs))
}

/// Process-local [`StorageClient`] with per-key expiry.
///
/// Values are not shared between processes. Expired keys are dropped on
/// access, swept periodically during writes, or removed on demand by
/// [`purge_expired`](Self::purge_expired).
#[derive(Debug, Default)]
pub struct MemoryStorageClient {
    inner: Mutex<MemoryInner>,
    closed: AtomicBool,
}

impl MemoryStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.purge();
        inner.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining TTL for a key, if it exists and has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut inner = self.inner.lock().await;
        inner.evict_if_expired(key);
        inner.expiry.remaining(key)
    }

    /// Drop every expired key, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.inner.lock().await.purge()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    async fn create(&self, key: &str, ttl_secs: u64, payload: &[u8]) -> Result<bool> {
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        inner.evict_if_expired(key);

        if inner.values.contains_key(key) {
            return Ok(false);
        }
        inner.put(key, ttl_secs, payload);
        Ok(true)
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        ttl_secs: u64,
        payload: &[u8],
    ) -> Result<bool> {
        debug!(key = %key, ttl_secs, "set_if_absent");
        self.create(key, ttl_secs, payload).await
    }

    async fn set_if_absent(&self, key: &str, payload: &[u8]) -> Result<bool> {
        debug!(key = %key, "set_if_absent");
        self.create(key, 0, payload).await
    }

    async fn set(&self, key: &str, ttl_secs: u64, payload: &[u8]) -> Result<bool> {
        debug!(key = %key, ttl_secs, "set");
        self.ensure_open()?;
        self.inner.lock().await.put(key, ttl_secs, payload);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!(key = %key, "get");
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        inner.evict_if_expired(key);
        Ok(inner.values.get(key).cloned())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        trace!(key = %key, ttl_secs, "expire");
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        inner.evict_if_expired(key);

        if !inner.values.contains_key(key) {
            return Ok(false);
        }
        inner.expiry.set(key, ttl(ttl_secs));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        debug!(key = %key, "delete");
        self.ensure_open()?;
        let mut inner = self.inner.lock().await;
        inner.evict_if_expired(key);
        inner.expiry.remove(key);
        Ok(inner.values.remove(key).is_some())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut inner = self.inner.lock().await;
            inner.values.clear();
            inner.expiry.clear();
            debug!("Memory storage closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_only_once() {
        let client = MemoryStorageClient::new();

        assert!(client.set_if_absent("k", b"first").await.unwrap());
        assert!(!client.set_if_absent("k", b"second").await.unwrap());
        assert_eq!(client.get("k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let client = MemoryStorageClient::new();

        client.set("k", 0, b"one").await.unwrap();
        client.set("k", 0, b"two").await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_ttl() {
        let client = MemoryStorageClient::new();

        client.set("k", 5, b"one").await.unwrap();
        client.set("k", 0, b"two").await.unwrap();
        assert_eq!(client.ttl("k").await, None);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(client.get("k").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_key_can_be_claimed_again() {
        let client = MemoryStorageClient::new();

        assert!(client.set_if_absent_with_ttl("k", 1, b"a").await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(client.set_if_absent_with_ttl("k", 1, b"b").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends_live_keys_only() {
        let client = MemoryStorageClient::new();

        client.set("k", 1, b"v").await.unwrap();
        assert!(client.expire("k", 10).await.unwrap());
        assert!(!client.expire("missing", 10).await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(client.get("k").await.unwrap().is_some());

        assert!(client.expire("k", 0).await.unwrap());
        assert_eq!(client.ttl("k").await, None);
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let client = MemoryStorageClient::new();

        client.set("k", 0, b"v").await.unwrap();
        assert!(client.delete("k").await.unwrap());
        assert!(!client.delete("k").await.unwrap());
        assert_eq!(client.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let client = MemoryStorageClient::new();

        client.set("short", 1, b"v").await.unwrap();
        client.set("long", 100, b"v").await.unwrap();
        client.set("forever", 0, b"v").await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(client.purge_expired().await, 1);
        assert_eq!(client.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_abandoned_keys() {
        let client = MemoryStorageClient::new();

        for i in 0..10 {
            client.set(&format!("old-{i}"), 1, b"v").await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        for i in 0..PURGE_INTERVAL {
            client.set_if_absent(&format!("new-{i}"), b"v").await.unwrap();
        }

        let inner = client.inner.lock().await;
        assert_eq!(inner.values.len(), PURGE_INTERVAL as usize);
        assert!(!inner.values.contains_key("old-0"));
        assert!(inner.expiry.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = MemoryStorageClient::new();
        client.set("k", 0, b"v").await.unwrap();

        client.close().await;
        client.close().await;

        assert!(matches!(client.get("k").await, Err(StorageError::Closed)));
        assert!(matches!(
            client.set_if_absent("k", b"v").await,
            Err(StorageError::Closed)
        ));
    }
}
