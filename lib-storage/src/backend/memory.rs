//! In-process cache backend for tests and single-node deployments
//!
//! One keyspace holds strings, lists and locks, mirroring a Redis-style
//! store: a lock is a string key set only-if-absent whose value is the
//! holder's token. Expiry is checked lazily against `tokio::time::Instant`
//! so paused-clock tests can drive TTLs deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::CacheStore;
use crate::errors::{CacheError, Result};
use crate::types::CacheConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Live entry for `key`, dropping it first if expired
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// Shared in-memory cache.
///
/// Clones share the same keyspace, so one instance can stand in for the
/// distributed cache seen by several simulated gateways.
#[derive(Clone, Debug)]
pub struct InMemoryCacheStore {
    keyspace: Arc<Mutex<Keyspace>>,
    config: CacheConfig,
}

impl InMemoryCacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            keyspace: Arc::new(Mutex::new(Keyspace::default())),
            config,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let keyspace = self.keyspace.lock();
        keyspace.entries.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock();
        let before = keyspace.entries.len();
        keyspace.entries.retain(|_, entry| !entry.is_expired(now));
        before - keyspace.entries.len()
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None => Ok(None),
            Some(Entry { value: Value::Str(value), .. }) => Ok(Some(value.clone())),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        only_if_absent: bool,
    ) -> Result<bool> {
        let mut keyspace = self.keyspace.lock();
        if only_if_absent && keyspace.live(key).is_some() {
            return Ok(false);
        }
        keyspace
            .entries
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string()), ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut keyspace = self.keyspace.lock();
        let existed = keyspace.live(key).is_some();
        keyspace.entries.remove(key);
        Ok(existed)
    }

    async fn list_append(&self, key: &str, value: &str, ttl: Duration) -> Result<usize> {
        let mut keyspace = self.keyspace.lock();
        let expires_at = Some(Instant::now() + ttl);

        match keyspace.live(key) {
            Some(Entry { value: Value::List(items), expires_at: expiry }) => {
                items.push(value.to_string());
                *expiry = expires_at;
                Ok(items.len())
            }
            Some(_) => Err(CacheError::WrongType(key.to_string())),
            None => {
                keyspace.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(vec![value.to_string()]),
                        expires_at,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn list_read(&self, key: &str) -> Result<Vec<String>> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live(key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::List(items), .. }) => Ok(items.clone()),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.set(key, token, Some(ttl), true).await
    }

    async fn lock_release(&self, key: &str, token: &str) -> Result<bool> {
        let mut keyspace = self.keyspace.lock();
        let held_by_token = matches!(
            keyspace.live(key),
            Some(Entry { value: Value::Str(holder), .. }) if holder.as_str() == token
        );
        if held_by_token {
            keyspace.entries.remove(key);
        }
        Ok(held_by_token)
    }

    fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryCacheStore {
        InMemoryCacheStore::default()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = store();
        assert!(cache.set("key1", "value1", None, false).await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), Some("value1".to_string()));

        assert!(cache.delete("key1").await.unwrap());
        assert!(!cache.delete("key1").await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_only_if_absent() {
        let cache = store();
        assert!(cache.set("key1", "first", None, true).await.unwrap());
        assert!(!cache.set("key1", "second", None, true).await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), Some("first".to_string()));

        assert!(cache.set("key1", "third", None, false).await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), Some("third".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = store();
        cache.set("key1", "value1", Some(Duration::from_secs(10)), false).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("key1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("key1").await.unwrap(), None);
        assert!(cache.set("key1", "again", None, true).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_append_refreshes_ttl() {
        let cache = store();
        let ttl = Duration::from_secs(180);
        assert_eq!(cache.list_append("list", "gw-a;-80", ttl).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cache.list_append("list", "gw-b;-40", ttl).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(
            cache.list_read("list").await.unwrap(),
            vec!["gw-a;-80".to_string(), "gw-b;-40".to_string()]
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.list_read("list").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let cache = store();
        cache.set("string", "v", None, false).await.unwrap();
        cache.list_append("list", "v", Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            cache.list_append("string", "x", Duration::from_secs(1)).await,
            Err(CacheError::WrongType("string".to_string()))
        );
        assert_eq!(cache.get("list").await, Err(CacheError::WrongType("list".to_string())));
    }

    #[tokio::test]
    async fn test_lock_release_requires_token() {
        let cache = store();
        let ttl = Duration::from_secs(10);
        assert!(cache.try_lock("lock", "owner-a", ttl).await.unwrap());
        assert!(!cache.try_lock("lock", "owner-b", ttl).await.unwrap());

        assert!(!cache.lock_release("lock", "owner-b").await.unwrap());
        assert!(cache.lock_release("lock", "owner-a").await.unwrap());
        assert!(cache.try_lock("lock", "owner-b", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires() {
        let cache = store();
        assert!(cache.try_lock("lock", "a", Duration::from_millis(200)).await.unwrap());
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(cache.try_lock("lock", "b", Duration::from_millis(200)).await.unwrap());
        assert!(!cache.lock_release("lock", "a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_take_waits_for_release() {
        let cache = store();
        let ttl = Duration::from_secs(10);
        assert!(cache.try_lock("lock", "a", ttl).await.unwrap());

        let releaser = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            releaser.lock_release("lock", "a").await.unwrap();
        });

        let started = Instant::now();
        assert!(cache.lock_take("lock", "b", ttl, true).await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(350));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_take_times_out() {
        let cache = InMemoryCacheStore::new(CacheConfig {
            lock_wait_timeout: Duration::from_secs(2),
            lock_poll_interval: Duration::from_millis(100),
        });
        assert!(cache.try_lock("lock", "a", Duration::from_secs(60)).await.unwrap());

        let err = cache
            .lock_take("lock", "b", Duration::from_secs(60), true)
            .await
            .unwrap_err();
        match err {
            CacheError::LockTimeout { key, waited } => {
                assert_eq!(key, "lock");
                assert!(waited >= Duration::from_secs(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_blocking_take_fails_fast() {
        let cache = store();
        assert!(cache.lock_take("lock", "a", Duration::from_secs(1), false).await.unwrap());
        assert!(!cache.lock_take("lock", "b", Duration::from_secs(1), false).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_len_and_purge() {
        let cache = store();
        cache.set("short", "v", Some(Duration::from_secs(1)), false).await.unwrap();
        cache.set("long", "v", None, false).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(!cache.is_empty());
    }
}
