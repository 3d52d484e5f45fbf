//! Uplink deduplication across gateways
//!
//! Several gateways may hear the same uplink. Under the device lock, the
//! first gateway to report a new FCntUp becomes the owner; later reports of
//! that FCntUp (or an older one) from other gateways are duplicates. The
//! owner re-delivering its own frame is not a duplicate.

use std::sync::Arc;

use lib_storage::CacheError;
use lib_types::{DevEui, GatewayId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::device_state::{CachedDeviceState, DeviceStateCache};
use crate::errors::{CoordinatorError, Result};
use crate::transport::ConnectionControl;

/// Owner reported when the device lock could not be taken
pub const UNKNOWN_OWNER: &str = "[unknown]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeduplicationResult {
    pub is_duplicate: bool,
    pub owning_gateway_id: GatewayId,
}

impl DeduplicationResult {
    fn owned_by(gateway_id: &GatewayId) -> Self {
        Self {
            is_duplicate: false,
            owning_gateway_id: gateway_id.clone(),
        }
    }

    fn duplicate_of(owner: GatewayId) -> Self {
        Self {
            is_duplicate: true,
            owning_gateway_id: owner,
        }
    }
}

pub struct DeduplicationCoordinator {
    states: DeviceStateCache,
    control: Arc<dyn ConnectionControl>,
    config: CoordinatorConfig,
}

impl DeduplicationCoordinator {
    pub fn new(states: DeviceStateCache, control: Arc<dyn ConnectionControl>, config: CoordinatorConfig) -> Self {
        Self {
            states,
            control,
            config,
        }
    }

    /// Decide whether `gateway_id`'s copy of uplink `client_fcnt_up` is the
    /// authoritative one.
    ///
    /// A lock timeout is not an error: the result is a duplicate with owner
    /// [`UNKNOWN_OWNER`], so the caller does not process a frame whose
    /// ownership is unknown.
    pub async fn resolve(
        &self,
        dev_eui: DevEui,
        gateway_id: &GatewayId,
        client_fcnt_up: u32,
        client_fcnt_down: u32,
    ) -> Result<DeduplicationResult> {
        let lock = match self.states.lock(dev_eui, gateway_id).await {
            Ok(lock) => lock,
            Err(CoordinatorError::Cache(CacheError::LockTimeout { waited, .. })) => {
                warn!(
                    dev_eui = %dev_eui,
                    gateway_id = %gateway_id,
                    waited_ms = waited.as_millis() as u64,
                    "Device lock timed out during deduplication"
                );
                return Ok(DeduplicationResult::duplicate_of(GatewayId::from(UNKNOWN_OWNER)));
            }
            Err(e) => return Err(e),
        };

        let outcome = self
            .resolve_locked(dev_eui, gateway_id, client_fcnt_up, client_fcnt_down)
            .await;
        lock.release().await?;
        outcome
    }

    async fn resolve_locked(
        &self,
        dev_eui: DevEui,
        gateway_id: &GatewayId,
        client_fcnt_up: u32,
        client_fcnt_down: u32,
    ) -> Result<DeduplicationResult> {
        let Some(mut state) = self.states.read(dev_eui).await? else {
            let state = CachedDeviceState::new(client_fcnt_up, client_fcnt_down, gateway_id.clone());
            self.states.initialize(dev_eui, &state).await?;
            debug!(dev_eui = %dev_eui, gateway_id = %gateway_id, fcnt_up = client_fcnt_up, "First uplink seen");
            return Ok(DeduplicationResult::owned_by(gateway_id));
        };

        if state.fcnt_up < client_fcnt_up {
            let previous_owner = std::mem::replace(&mut state.gateway_id, gateway_id.clone());
            state.fcnt_up = client_fcnt_up;
            state.updated_at = crate::device_state::unix_now();
            self.states.store(dev_eui, &state).await?;

            if previous_owner != *gateway_id {
                info!(
                    dev_eui = %dev_eui,
                    previous = %previous_owner,
                    owner = %gateway_id,
                    "Device ownership moved to another gateway"
                );
                self.notify_previous_owner(previous_owner, dev_eui);
            }
            return Ok(DeduplicationResult::owned_by(gateway_id));
        }

        if state.fcnt_up == client_fcnt_up && state.gateway_id == *gateway_id {
            debug!(dev_eui = %dev_eui, gateway_id = %gateway_id, fcnt_up = client_fcnt_up, "Owner re-delivered uplink");
            return Ok(DeduplicationResult::owned_by(gateway_id));
        }

        debug!(
            dev_eui = %dev_eui,
            gateway_id = %gateway_id,
            owner = %state.gateway_id,
            fcnt_up = client_fcnt_up,
            cached_fcnt_up = state.fcnt_up,
            "Duplicate uplink"
        );
        Ok(DeduplicationResult::duplicate_of(state.gateway_id))
    }

    /// Fire-and-forget; failures and timeouts are only logged
    fn notify_previous_owner(&self, previous_owner: GatewayId, dev_eui: DevEui) {
        let control = Arc::clone(&self.control);
        let timeout = self.config.close_connection_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, control.notify_close_connection(&previous_owner, dev_eui)).await {
                Ok(Ok(())) => debug!(dev_eui = %dev_eui, gateway_id = %previous_owner, "Close-connection sent"),
                Ok(Err(e)) => warn!(
                    dev_eui = %dev_eui,
                    gateway_id = %previous_owner,
                    error = %e,
                    "Close-connection notification failed"
                ),
                Err(_) => warn!(
                    dev_eui = %dev_eui,
                    gateway_id = %previous_owner,
                    "Close-connection notification timed out"
                ),
            }
        });
    }
}
