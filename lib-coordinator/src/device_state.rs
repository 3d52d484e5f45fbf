//! Per-device state shared by every gateway
//!
//! | Key                          | Value                                  |
//! |------------------------------|----------------------------------------|
//! | `{devEUI}`                   | JSON [`CachedDeviceState`]             |
//! | `{devEUI}:devicelock`        | lock token                             |
//!
//! Reads outside the lock may be stale. Every mutation happens while the
//! device lock is held.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lib_storage::{CacheLock, CacheStore};
use lib_types::{DevEui, GatewayId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CoordinatorConfig;
use crate::errors::{CoordinatorError, Result};
use crate::preferred_gateway::{preferred_gateway_key, preferred_gateway_lock_key};

/// Counters and owner last agreed on for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CachedDeviceState {
    #[serde(rename = "FCntUp")]
    pub fcnt_up: u32,
    #[serde(rename = "FCntDown")]
    pub fcnt_down: u32,
    pub gateway_id: GatewayId,
    /// Unix seconds of the last write
    pub updated_at: u64,
}

impl CachedDeviceState {
    pub fn new(fcnt_up: u32, fcnt_down: u32, gateway_id: GatewayId) -> Self {
        Self {
            fcnt_up,
            fcnt_down,
            gateway_id,
            updated_at: unix_now(),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub fn device_state_key(dev_eui: DevEui) -> String {
    dev_eui.to_string()
}

pub fn device_lock_key(dev_eui: DevEui) -> String {
    format!("{}:devicelock", dev_eui)
}

/// Typed access to cached device state
#[derive(Clone)]
pub struct DeviceStateCache {
    cache: Arc<dyn CacheStore>,
    config: CoordinatorConfig,
}

impl DeviceStateCache {
    pub fn new(cache: Arc<dyn CacheStore>, config: CoordinatorConfig) -> Self {
        Self { cache, config }
    }

    /// Take the device lock, waiting up to the cache's lock timeout.
    ///
    /// Fails with `CacheError::LockTimeout` if the lock stays held.
    pub async fn lock(&self, dev_eui: DevEui, owner: &GatewayId) -> Result<CacheLock> {
        let key = device_lock_key(dev_eui);
        CacheLock::acquire(
            Arc::clone(&self.cache),
            key.clone(),
            owner.as_str(),
            self.config.device_lock_ttl,
            true,
        )
        .await?
        .ok_or_else(|| {
            // A blocking take only returns without the lock on timeout
            CoordinatorError::Cache(lib_storage::CacheError::LockTimeout {
                key,
                waited: self.cache.config().lock_wait_timeout,
            })
        })
    }

    pub async fn read(&self, dev_eui: DevEui) -> Result<Option<CachedDeviceState>> {
        let key = device_state_key(dev_eui);
        match self.cache.get(&key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CoordinatorError::CorruptCacheValue {
                    key,
                    reason: e.to_string(),
                }),
        }
    }

    /// Write state only if none exists. Returns whether it was written.
    pub async fn initialize(&self, dev_eui: DevEui, state: &CachedDeviceState) -> Result<bool> {
        self.write(dev_eui, state, true).await
    }

    /// Overwrite state
    pub async fn store(&self, dev_eui: DevEui, state: &CachedDeviceState) -> Result<()> {
        self.write(dev_eui, state, false).await.map(|_| ())
    }

    async fn write(&self, dev_eui: DevEui, state: &CachedDeviceState, only_if_absent: bool) -> Result<bool> {
        let key = device_state_key(dev_eui);
        let raw = serde_json::to_string(state).map_err(|e| CoordinatorError::CorruptCacheValue {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok(self
            .cache
            .set(&key, &raw, Some(self.config.device_state_ttl), only_if_absent)
            .await?)
    }

    /// Forget everything cached for a device: counters, owner, preferred
    /// gateway and any held locks.
    pub async fn reset(&self, dev_eui: DevEui) -> Result<()> {
        for key in [
            device_state_key(dev_eui),
            device_lock_key(dev_eui),
            preferred_gateway_key(dev_eui),
            preferred_gateway_lock_key(dev_eui),
        ] {
            self.cache.delete(&key).await?;
        }
        info!(dev_eui = %dev_eui, "Device cache reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_storage::InMemoryCacheStore;

    const DEV_EUI: DevEui = DevEui(0x0004_A30B_001C_0530);

    fn states() -> (Arc<InMemoryCacheStore>, DeviceStateCache) {
        let store = Arc::new(InMemoryCacheStore::default());
        let cache = DeviceStateCache::new(store.clone(), CoordinatorConfig::default());
        (store, cache)
    }

    #[test]
    fn test_keys() {
        assert_eq!(device_state_key(DEV_EUI), "0004A30B001C0530");
        assert_eq!(device_lock_key(DEV_EUI), "0004A30B001C0530:devicelock");
    }

    #[test]
    fn test_json_layout() {
        let state = CachedDeviceState {
            fcnt_up: 5,
            fcnt_down: 2,
            gateway_id: GatewayId::from("gw-1"),
            updated_at: 1_700_000_000,
        };
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            r#"{"FCntUp":5,"FCntDown":2,"GatewayId":"gw-1","UpdatedAt":1700000000}"#
        );
    }

    #[tokio::test]
    async fn test_initialize_only_once() {
        let (_, cache) = states();
        let first = CachedDeviceState::new(1, 0, GatewayId::from("gw-1"));
        let second = CachedDeviceState::new(9, 9, GatewayId::from("gw-2"));

        assert!(cache.initialize(DEV_EUI, &first).await.unwrap());
        assert!(!cache.initialize(DEV_EUI, &second).await.unwrap());
        assert_eq!(cache.read(DEV_EUI).await.unwrap(), Some(first));

        cache.store(DEV_EUI, &second).await.unwrap();
        assert_eq!(cache.read(DEV_EUI).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_corrupt_value() {
        let (store, cache) = states();
        store.set(&device_state_key(DEV_EUI), "not json", None, false).await.unwrap();
        assert!(matches!(
            cache.read(DEV_EUI).await,
            Err(CoordinatorError::CorruptCacheValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_state_and_locks() {
        let (store, cache) = states();
        let gw = GatewayId::from("gw-1");
        cache.initialize(DEV_EUI, &CachedDeviceState::new(1, 1, gw.clone())).await.unwrap();
        store.set(&preferred_gateway_key(DEV_EUI), "gw-1;1;0", None, false).await.unwrap();
        let lock = cache.lock(DEV_EUI, &gw).await.unwrap();

        cache.reset(DEV_EUI).await.unwrap();
        assert!(store.is_empty());
        assert!(!lock.release().await.unwrap());
    }
}
