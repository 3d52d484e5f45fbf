//! Shared cache capability.
//!
//! Every gateway process handling the same device talks to one logical
//! cache. The coordinator only relies on the operations below, so the store
//! can be Redis, etcd, or the in-process [`InMemoryCacheStore`] used by
//! tests and single-node deployments.
//!
//! ## Example
//! ```rust,ignore
//! use lib_storage::backend::CacheStore;
//!
//! async fn first_writer_wins<S: CacheStore>(cache: &S) -> lib_storage::Result<bool> {
//!     cache.set("0004A30B001C0530", "{}", None, true).await
//! }
//! ```
//!
//! [`InMemoryCacheStore`]: super::memory::InMemoryCacheStore

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{CacheError, Result};
use crate::types::CacheConfig;

/// Async cache abstraction with TTLs, append-only lists and token locks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value.
    ///
    /// With `only_if_absent` the write is skipped when the key exists and
    /// `false` is returned. `ttl = None` keeps the value until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>, only_if_absent: bool)
        -> Result<bool>;

    /// Remove a key of any kind. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Append to a list and (re)arm its expiry. Returns the new length.
    async fn list_append(&self, key: &str, value: &str, ttl: Duration) -> Result<usize>;

    /// All list values in append order; empty when the key is missing.
    async fn list_read(&self, key: &str) -> Result<Vec<String>>;

    /// Single attempt to take `key` for `token`.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Release `key` only if `token` still holds it.
    async fn lock_release(&self, key: &str, token: &str) -> Result<bool>;

    /// Lock acquisition tuning for [`CacheStore::lock_take`].
    fn config(&self) -> &CacheConfig;

    /// Take a lock.
    ///
    /// Non-blocking takes make one attempt. Blocking takes poll every
    /// `lock_poll_interval` and fail with [`CacheError::LockTimeout`] once
    /// `lock_wait_timeout` has elapsed.
    async fn lock_take(&self, key: &str, token: &str, ttl: Duration, blocking: bool) -> Result<bool> {
        if !blocking {
            return self.try_lock(key, token, ttl).await;
        }

        let started = Instant::now();
        let wait_timeout = self.config().lock_wait_timeout;
        let poll_interval = self.config().lock_poll_interval;

        loop {
            if self.try_lock(key, token, ttl).await? {
                return Ok(true);
            }

            let waited = started.elapsed();
            if waited >= wait_timeout {
                return Err(CacheError::LockTimeout {
                    key: key.to_string(),
                    waited,
                });
            }

            debug!(key = %key, waited_ms = waited.as_millis() as u64, "Lock held elsewhere, polling");
            tokio::time::sleep(poll_interval.min(wait_timeout - waited)).await;
        }
    }
}
