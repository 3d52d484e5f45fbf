//! Device registry interface
//!
//! The registry (device twin store) is external. The coordinator only
//! needs typed lookups; property-bag parsing and persistence stay on the
//! registry side of this boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use lib_types::{AppKey, DevAddr, DevEui, GatewayId, JoinEui, SessionKeys};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// LoRaWAN device class as far as downlink routing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceClass {
    #[default]
    A,
    C,
}

/// An active session, either from a completed join or provisioned (ABP)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub dev_addr: DevAddr,
    #[serde(flatten)]
    pub keys: SessionKeys,
    /// Last uplink counter the registry knows about
    #[serde(default)]
    pub fcnt_up: u32,
    /// Last downlink counter the registry knows about
    #[serde(default)]
    pub fcnt_down: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub dev_eui: DevEui,
    pub join_eui: JoinEui,
    /// Root key; required for OTAA
    #[serde(default)]
    pub app_key: Option<AppKey>,
    #[serde(default)]
    pub session: Option<DeviceSession>,
    #[serde(default)]
    pub class: DeviceClass,
    /// Gateway that always serves this device; unset means any gateway may
    #[serde(default)]
    pub home_gateway: Option<GatewayId>,
    /// DevAddr handed out on join instead of a random one
    #[serde(default)]
    pub fixed_dev_addr: Option<DevAddr>,
    #[serde(default)]
    pub supports_32bit_fcnt: bool,
}

impl DeviceRecord {
    /// Class C device without a home gateway: downlinks go through the
    /// gateway with the best signal for each uplink
    pub fn uses_preferred_gateway(&self) -> bool {
        self.class == DeviceClass::C && self.home_gateway.is_none()
    }

    /// A device must be able to join or already hold a session
    pub fn validate(&self) -> Result<(), String> {
        if self.app_key.is_none() && self.session.is_none() {
            return Err(format!(
                "device {} has neither an AppKey nor session keys",
                self.dev_eui
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn lookup(&self, dev_eui: DevEui) -> anyhow::Result<Option<DeviceRecord>>;

    /// Every device currently holding `dev_addr`. DevAddrs are not unique,
    /// so the caller picks the one whose NwkSKey verifies the MIC.
    async fn lookup_by_dev_addr(&self, dev_addr: DevAddr) -> anyhow::Result<Vec<DeviceRecord>>;
}

/// Registry held in process memory, loaded from configuration
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<DevEui, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        let devices = records.into_iter().map(|record| (record.dev_eui, record)).collect();
        Self {
            devices: RwLock::new(devices),
        }
    }

    pub fn insert(&self, record: DeviceRecord) {
        self.devices.write().insert(record.dev_eui, record);
    }

    /// Persist a session produced by a join. Returns false for unknown devices.
    pub fn store_session(&self, dev_eui: DevEui, session: DeviceSession) -> bool {
        match self.devices.write().get_mut(&dev_eui) {
            Some(record) => {
                record.session = Some(session);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn lookup(&self, dev_eui: DevEui) -> anyhow::Result<Option<DeviceRecord>> {
        Ok(self.devices.read().get(&dev_eui).cloned())
    }

    async fn lookup_by_dev_addr(&self, dev_addr: DevAddr) -> anyhow::Result<Vec<DeviceRecord>> {
        Ok(self
            .devices
            .read()
            .values()
            .filter(|record| matches!(&record.session, Some(session) if session.dev_addr == dev_addr))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dev_eui: u64, dev_addr: Option<u32>) -> DeviceRecord {
        DeviceRecord {
            dev_eui: DevEui(dev_eui),
            join_eui: JoinEui(1),
            app_key: Some(AppKey::from_bytes([1; 16])),
            session: dev_addr.map(|addr| DeviceSession {
                dev_addr: DevAddr(addr),
                keys: SessionKeys {
                    nwk_s_key: [2; 16].into(),
                    app_s_key: [3; 16].into(),
                },
                fcnt_up: 0,
                fcnt_down: 0,
            }),
            class: DeviceClass::A,
            home_gateway: None,
            fixed_dev_addr: None,
            supports_32bit_fcnt: false,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_dev_addr_returns_all_holders() {
        let registry = InMemoryDeviceRegistry::new([
            record(1, Some(0xAA)),
            record(2, Some(0xAA)),
            record(3, Some(0xBB)),
            record(4, None),
        ]);

        let mut shared = registry.lookup_by_dev_addr(DevAddr(0xAA)).await.unwrap();
        shared.sort_by_key(|r| r.dev_eui);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared[0].dev_eui, DevEui(1));
        assert!(registry.lookup_by_dev_addr(DevAddr(0xCC)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_session() {
        let registry = InMemoryDeviceRegistry::new([record(1, None)]);
        let session = record(9, Some(0x42)).session.unwrap();

        assert!(registry.store_session(DevEui(1), session.clone()));
        assert!(!registry.store_session(DevEui(2), session.clone()));
        let found = registry.lookup(DevEui(1)).await.unwrap().unwrap();
        assert_eq!(found.session, Some(session));
    }

    #[test]
    fn test_preferred_gateway_mode() {
        let mut device = record(1, None);
        assert!(!device.uses_preferred_gateway());
        device.class = DeviceClass::C;
        assert!(device.uses_preferred_gateway());
        device.home_gateway = Some(GatewayId::from("gw-home"));
        assert!(!device.uses_preferred_gateway());
    }

    #[test]
    fn test_validate_requires_keys() {
        let mut device = record(1, None);
        assert!(device.validate().is_ok());
        device.app_key = None;
        assert!(device.validate().is_err());
    }
}
