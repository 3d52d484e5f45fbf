//! Adaptive Data Rate hook
//!
//! ADR itself is external. It runs inside the per-uplink pipeline because
//! a rate change needs a downlink, and when it reserves a downlink counter
//! the frame-counter step must use that value instead of issuing another.

use async_trait::async_trait;
use lib_types::{DevEui, GatewayId};
use serde::{Deserialize, Serialize};

/// Radio facts for one received uplink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdrRequest {
    pub fcnt_up: u32,
    pub fcnt_down: u32,
    pub rssi: f64,
    /// Device asked for a confirmation of its ADR settings
    pub adr_ack_requested: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdrResult {
    pub can_confirm_to_device: bool,
    pub data_rate: Option<u8>,
    pub tx_power: Option<u8>,
    pub nb_repetition: Option<u8>,
    /// Downlink counter already reserved by the ADR engine
    pub fcnt_down: Option<u32>,
}

#[async_trait]
pub trait AdrCalculator: Send + Sync {
    async fn calculate(
        &self,
        dev_eui: DevEui,
        gateway_id: &GatewayId,
        request: &AdrRequest,
    ) -> anyhow::Result<AdrResult>;
}
