//! Scoped cache lock
//!
//! [`CacheLock`] owns one held lock. Release it explicitly with
//! [`CacheLock::release`]; if the guard is dropped first (early return,
//! error, cancelled future) the release is spawned on the current Tokio
//! runtime. The lock TTL bounds how long a crashed holder can block others.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::CacheStore;
use crate::errors::Result;

pub struct CacheLock {
    store: Arc<dyn CacheStore>,
    key: String,
    token: String,
    released: bool,
}

impl CacheLock {
    /// Take `key` on behalf of `owner`.
    ///
    /// The stored token is `owner` plus a random suffix so two requests from
    /// the same owner never release each other's lock. Returns `Ok(None)`
    /// when a non-blocking take finds the lock held; a blocking take that
    /// runs out of time returns `CacheError::LockTimeout`.
    pub async fn acquire(
        store: Arc<dyn CacheStore>,
        key: impl Into<String>,
        owner: &str,
        ttl: Duration,
        blocking: bool,
    ) -> Result<Option<Self>> {
        let key = key.into();
        let token = format!("{}:{:016x}", owner, rand::random::<u64>());

        if !store.lock_take(&key, &token, ttl, blocking).await? {
            return Ok(None);
        }

        debug!(key = %key, owner = %owner, "Cache lock taken");
        Ok(Some(Self {
            store,
            key,
            token,
            released: false,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release now. Returns `false` if the lock had already expired and
    /// been taken over.
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        let released = self.store.lock_release(&self.key, &self.token).await?;
        if !released {
            warn!(key = %self.key, "Cache lock expired before release");
        }
        Ok(released)
    }
}

impl fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLock")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "Cache lock dropped outside a runtime; left to expire");
            return;
        };

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = store.lock_release(&key, &token).await {
                warn!(key = %key, error = %e, "Deferred cache lock release failed");
            }
        });
    }
}
