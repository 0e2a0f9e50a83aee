//! Storage clients for replicated session state.
//!
//! Every client implements [`StorageClient`], an async TTL key-value contract
//! with atomic create-if-absent semantics:
//! - [`RedisStorageClient`] talks to Redis over a multiplexed, auto-reconnecting
//!   connection shared by all callers
//! - [`MemoryStorageClient`] keeps everything in process, for tests and
//!   single-instance deployments
//!
//! Clients never retry. Retry policy belongs to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsm_storage::{RedisConfig, RedisStorageClient, StorageClient};
//!
//! let client = RedisStorageClient::connect(&RedisConfig::new("redis://127.0.0.1/")).await?;
//! if client.set_if_absent("abc", b"null").await? {
//!     client.set("abc", 1800, &payload).await?;
//! }
//! ```

mod client;
mod error;
mod expiry;
mod memory;
mod redis_client;

pub use client::StorageClient;
pub use error::{Result, StorageError};
pub use expiry::ExpiryTracker;
pub use memory::MemoryStorageClient;
pub use redis_client::{DEFAULT_TIMEOUT, RedisConfig, RedisStorageClient};
