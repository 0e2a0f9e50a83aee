//! The storage client contract.

use async_trait::async_trait;

use crate::error::Result;

/// Async client for a TTL-backed key-value store.
///
/// Keys are used verbatim; namespacing is up to the caller. A TTL of `0`
/// means the key never expires. Consecutive calls are not ordered unless the
/// caller awaits each one before issuing the next.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Atomically create `key` only if it does not exist, expiring after
    /// `ttl_secs` seconds.
    ///
    /// Returns `false` without side effects when the key already exists.
    async fn set_if_absent_with_ttl(&self, key: &str, ttl_secs: u64, payload: &[u8])
    -> Result<bool>;

    /// Atomically create `key` only if it does not exist, without expiry.
    async fn set_if_absent(&self, key: &str, payload: &[u8]) -> Result<bool>;

    /// Unconditionally write `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, ttl_secs: u64, payload: &[u8]) -> Result<bool>;

    /// Read the raw payload, or `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Reset the TTL of an existing key without touching its value. A TTL of
    /// `0` removes any expiry. Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool>;

    /// Remove `key`, returning whether a key was actually removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Release all connections. Calling this more than once is a no-op.
    async fn close(&self);
}
