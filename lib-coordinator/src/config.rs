//! Coordinator configuration
//!
//! ```toml
//! [coordinator]
//! net_id = "000013"
//! device_lock_ttl = "10s"
//! preferred_gateway_receive_interval = "200ms"
//! ```

use std::time::Duration;

use lib_types::NetId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// NetID written into every Join-Accept; its NwkID prefixes new DevAddrs
    #[serde(default)]
    pub net_id: NetId,

    /// Expiry of the per-device lock guarding cached device state
    #[serde(with = "humantime_serde", default = "default_device_lock_ttl")]
    pub device_lock_ttl: Duration,

    /// Expiry of cached device state, refreshed on every write
    #[serde(with = "humantime_serde", default = "default_device_state_ttl")]
    pub device_state_ttl: Duration,

    /// Collection window during which sibling gateways report RSSI
    #[serde(with = "humantime_serde", default = "default_receive_interval")]
    pub preferred_gateway_receive_interval: Duration,

    /// Expiry of the per-uplink RSSI candidate list
    #[serde(with = "humantime_serde", default = "default_list_ttl")]
    pub preferred_gateway_list_ttl: Duration,

    /// Expiry of the election lock
    #[serde(with = "humantime_serde", default = "default_election_lock_ttl")]
    pub preferred_gateway_lock_ttl: Duration,

    /// Election lock attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub preferred_gateway_max_attempts: u32,

    /// Deadline for telling a previous owner to drop its connection
    #[serde(with = "humantime_serde", default = "default_close_connection_timeout")]
    pub close_connection_timeout: Duration,

    /// How long a used DevNonce is remembered; unset keeps it forever
    #[serde(with = "humantime_serde", default)]
    pub dev_nonce_ttl: Option<Duration>,
}

fn default_device_lock_ttl() -> Duration {
    Duration::from_secs(10)
}

fn default_device_state_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_receive_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_list_ttl() -> Duration {
    Duration::from_secs(3 * 60)
}

fn default_election_lock_ttl() -> Duration {
    Duration::from_millis(200)
}

fn default_max_attempts() -> u32 {
    10
}

fn default_close_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            net_id: NetId::default(),
            device_lock_ttl: default_device_lock_ttl(),
            device_state_ttl: default_device_state_ttl(),
            preferred_gateway_receive_interval: default_receive_interval(),
            preferred_gateway_list_ttl: default_list_ttl(),
            preferred_gateway_lock_ttl: default_election_lock_ttl(),
            preferred_gateway_max_attempts: default_max_attempts(),
            close_connection_timeout: default_close_connection_timeout(),
            dev_nonce_ttl: None,
        }
    }
}

impl CoordinatorConfig {
    /// Back-off between contested election lock attempts
    pub fn preferred_gateway_retry_delay(&self) -> Duration {
        (self.preferred_gateway_receive_interval / 4).max(Duration::from_millis(50))
    }
}
