//! Downlink frame-counter issuance
//!
//! Only the gateway that owns the current uplink gets a downlink counter.
//! Counters issued for a device strictly increase until the device cache
//! is reset:
//!
//! | Cached state                          | Issued                         |
//! |---------------------------------------|--------------------------------|
//! | none                                  | `client_down + 1` (cache init) |
//! | `client_up > cached_up`               | `max(client_down, cached_down) + 1` |
//! | same FCntUp, same gateway             | `max(client_down, cached_down) + 1` |
//! | anything else                         | nothing                        |

use lib_storage::CacheError;
use lib_types::{DevEui, GatewayId};
use tracing::{debug, warn};

use crate::device_state::{unix_now, CachedDeviceState, DeviceStateCache};
use crate::errors::{CoordinatorError, Result};

pub struct FrameCounterPolicy {
    states: DeviceStateCache,
}

impl FrameCounterPolicy {
    pub fn new(states: DeviceStateCache) -> Self {
        Self { states }
    }

    /// Next downlink counter for `gateway_id`, or `None` when this gateway
    /// must not send (not the owner, or the device lock timed out).
    ///
    /// When ADR already reserved a counter for this uplink, use that value
    /// and do not call this; the pipeline takes care of it.
    pub async fn next_fcnt_down(
        &self,
        dev_eui: DevEui,
        gateway_id: &GatewayId,
        client_fcnt_up: u32,
        client_fcnt_down: u32,
    ) -> Result<Option<u32>> {
        let lock = match self.states.lock(dev_eui, gateway_id).await {
            Ok(lock) => lock,
            Err(CoordinatorError::Cache(CacheError::LockTimeout { .. })) => {
                warn!(dev_eui = %dev_eui, gateway_id = %gateway_id, "Device lock timed out issuing FCntDown");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let outcome = self
            .next_locked(dev_eui, gateway_id, client_fcnt_up, client_fcnt_down)
            .await;
        lock.release().await?;
        outcome
    }

    async fn next_locked(
        &self,
        dev_eui: DevEui,
        gateway_id: &GatewayId,
        client_fcnt_up: u32,
        client_fcnt_down: u32,
    ) -> Result<Option<u32>> {
        let Some(mut state) = self.states.read(dev_eui).await? else {
            let next = client_fcnt_down.wrapping_add(1);
            let state = CachedDeviceState::new(client_fcnt_up, next, gateway_id.clone());
            self.states.initialize(dev_eui, &state).await?;
            debug!(dev_eui = %dev_eui, fcnt_down = next, "FCntDown initialized");
            return Ok(Some(next));
        };

        // Deduplication has usually recorded this FCntUp and owner already
        if client_fcnt_up > state.fcnt_up {
            state.fcnt_up = client_fcnt_up;
            state.gateway_id = gateway_id.clone();
        } else if client_fcnt_up != state.fcnt_up || state.gateway_id != *gateway_id {
            debug!(
                dev_eui = %dev_eui,
                gateway_id = %gateway_id,
                owner = %state.gateway_id,
                "Not the owner, no FCntDown issued"
            );
            return Ok(None);
        }

        let next = client_fcnt_down.max(state.fcnt_down).wrapping_add(1);
        state.fcnt_down = next;
        state.updated_at = unix_now();
        self.states.store(dev_eui, &state).await?;
        debug!(dev_eui = %dev_eui, gateway_id = %gateway_id, fcnt_down = next, "FCntDown issued");
        Ok(Some(next))
    }
}
