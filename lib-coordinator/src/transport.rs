//! Gateway-facing collaborators
//!
//! Both are implemented by the transport layer: the connection to each
//! gateway's LNS socket and whatever channel reaches sibling processes.

use async_trait::async_trait;
use lib_types::{DevEui, GatewayId};

/// Outgoing frames towards a gateway
#[async_trait]
pub trait DownlinkSender: Send + Sync {
    async fn send_downlink(&self, frame: &[u8], gateway_id: &GatewayId) -> anyhow::Result<()>;
}

/// Cross-gateway control channel
#[async_trait]
pub trait ConnectionControl: Send + Sync {
    /// Ask `gateway_id` to drop its connection state for `dev_eui` because
    /// another gateway now owns the device. Best effort.
    async fn notify_close_connection(&self, gateway_id: &GatewayId, dev_eui: DevEui) -> anyhow::Result<()>;
}

/// Control channel for single-gateway deployments; nothing to notify
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnectionControl;

#[async_trait]
impl ConnectionControl for NoopConnectionControl {
    async fn notify_close_connection(&self, _gateway_id: &GatewayId, _dev_eui: DevEui) -> anyhow::Result<()> {
        Ok(())
    }
}
