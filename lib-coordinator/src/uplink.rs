//! Uplink entry point
//!
//! `NetworkServer::handle_uplink` takes raw bytes from one gateway and
//! returns what that gateway should do with them:
//!
//! ```text
//! bytes ─► decode ─┬─► JoinRequest ─► registry ─► MIC ─► DevNonce guard ─► Join-Accept
//!                  └─► DataUp ──────► registry ─► FCnt ─► MIC ─► bundler ─► decrypt ─► ACK
//! ```
//!
//! Malformed frames, unknown devices and MIC failures all end in
//! [`DownlinkDecision::Drop`] without touching the cache.

use std::sync::Arc;

use lib_crypto::derive_session_keys;
use lib_network::{reconstruct_fcnt, DataFrame, Frame, FramePayload, JoinAccept, JoinRequest};
use lib_storage::CacheStore;
use lib_types::conversion::bytes_to_hex;
use lib_types::{AppKey, AppNonce, DevAddr, DevEui, DevNonce, GatewayId};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::adr::{AdrCalculator, AdrRequest};
use crate::bundler::{BundlerRequest, FunctionBundler, FunctionItems};
use crate::config::CoordinatorConfig;
use crate::dedup::DeduplicationCoordinator;
use crate::device_state::DeviceStateCache;
use crate::errors::{CoordinatorError, Result};
use crate::fcnt_down::FrameCounterPolicy;
use crate::preferred_gateway::{PreferredGatewayResolver, PreferredGatewayResult};
use crate::registry::{DeviceRecord, DeviceRegistry, DeviceSession};
use crate::transport::{ConnectionControl, DownlinkSender, NoopConnectionControl};

/// Join-Accept DLSettings: RX1 offset 0, RX2 data rate 0
const JOIN_DL_SETTINGS: u8 = 0x00;
/// Join-Accept RxDelay in seconds
const JOIN_RX_DELAY: u8 = 1;

pub fn dev_nonce_key(dev_eui: DevEui, dev_nonce: DevNonce) -> String {
    format!("devnonce:{}:{}", dev_eui, dev_nonce)
}

/// Decrypted application payload as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UplinkPayload {
    pub fport: Option<u8>,
    /// Plaintext as uppercase hex
    pub data: String,
}

impl From<&FramePayload> for UplinkPayload {
    fn from(payload: &FramePayload) -> Self {
        Self {
            fport: payload.fport(),
            data: bytes_to_hex(payload.data()),
        }
    }
}

/// Outcome of one gateway's copy of an uplink
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DownlinkDecision {
    /// Not for us: malformed, unknown device, failed authentication or a
    /// replayed join
    Drop,
    /// Another gateway owns this uplink
    Duplicate { owner: GatewayId },
    Accepted {
        dev_eui: DevEui,
        fcnt_up: u32,
        next_fcnt_down: Option<u32>,
        payload: UplinkPayload,
        downlink_sent: bool,
        preferred_gateway: Option<PreferredGatewayResult>,
    },
    JoinAccepted {
        dev_eui: DevEui,
        dev_addr: DevAddr,
        /// New session for the registry to persist; never serialized
        #[serde(skip)]
        session: DeviceSession,
        downlink_sent: bool,
    },
}

// ============================================================================
// Builder
// ============================================================================

pub struct NetworkServerBuilder {
    cache: Arc<dyn CacheStore>,
    registry: Arc<dyn DeviceRegistry>,
    downlinks: Arc<dyn DownlinkSender>,
    control: Arc<dyn ConnectionControl>,
    adr: Option<Arc<dyn AdrCalculator>>,
    config: CoordinatorConfig,
}

impl NetworkServerBuilder {
    pub fn connection_control(mut self, control: Arc<dyn ConnectionControl>) -> Self {
        self.control = control;
        self
    }

    pub fn adr(mut self, calculator: Arc<dyn AdrCalculator>) -> Self {
        self.adr = Some(calculator);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> NetworkServer {
        let states = DeviceStateCache::new(Arc::clone(&self.cache), self.config.clone());
        let bundler = FunctionBundler::new(
            Arc::new(DeduplicationCoordinator::new(
                states.clone(),
                self.control,
                self.config.clone(),
            )),
            Arc::new(FrameCounterPolicy::new(states.clone())),
            Arc::new(PreferredGatewayResolver::new(
                Arc::clone(&self.cache),
                self.config.clone(),
            )),
            self.adr.clone(),
        );

        NetworkServer {
            cache: self.cache,
            registry: self.registry,
            downlinks: self.downlinks,
            states,
            bundler,
            adr_enabled: self.adr.is_some(),
            config: self.config,
        }
    }
}

// ============================================================================
// NetworkServer
// ============================================================================

pub struct NetworkServer {
    cache: Arc<dyn CacheStore>,
    registry: Arc<dyn DeviceRegistry>,
    downlinks: Arc<dyn DownlinkSender>,
    states: DeviceStateCache,
    bundler: FunctionBundler,
    adr_enabled: bool,
    config: CoordinatorConfig,
}

impl NetworkServer {
    pub fn builder(
        cache: Arc<dyn CacheStore>,
        registry: Arc<dyn DeviceRegistry>,
        downlinks: Arc<dyn DownlinkSender>,
    ) -> NetworkServerBuilder {
        NetworkServerBuilder {
            cache,
            registry,
            downlinks,
            control: Arc::new(NoopConnectionControl),
            adr: None,
            config: CoordinatorConfig::default(),
        }
    }

    /// Process one uplink received by `gateway_id`.
    ///
    /// Only infrastructure failures are errors; check
    /// [`CoordinatorError::is_retryable`] before replaying.
    pub async fn handle_uplink(&self, bytes: &[u8], gateway_id: &GatewayId, rssi: f64) -> Result<DownlinkDecision> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(gateway_id = %gateway_id, error = %e, "Dropping malformed frame");
                return Ok(DownlinkDecision::Drop);
            }
        };

        let outcome = match frame {
            Frame::JoinRequest(request) => self.handle_join(request, gateway_id).await,
            Frame::DataUp(data) => self.handle_data(data, gateway_id, rssi).await,
            Frame::JoinAccept(_) | Frame::DataDown(_) => {
                debug!(gateway_id = %gateway_id, "Dropping downlink-direction frame on uplink path");
                return Ok(DownlinkDecision::Drop);
            }
        };

        if let Err(e) = &outcome {
            error!(gateway_id = %gateway_id, error = %e, retryable = e.is_retryable(), "Uplink processing failed");
        }
        outcome
    }

    /// Administrative cache reset for one device
    pub async fn reset_device_cache(&self, dev_eui: DevEui) -> Result<()> {
        self.states.reset(dev_eui).await
    }

    // ------------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------------

    async fn handle_join(&self, request: JoinRequest, gateway_id: &GatewayId) -> Result<DownlinkDecision> {
        let dev_eui = request.dev_eui;
        let Some(record) = self.registry.lookup(dev_eui).await.map_err(CoordinatorError::Registry)? else {
            debug!(dev_eui = %dev_eui, "Join from unknown device");
            return Ok(DownlinkDecision::Drop);
        };

        if record.join_eui != request.join_eui {
            debug!(dev_eui = %dev_eui, join_eui = %request.join_eui, "JoinEUI mismatch");
            return Ok(DownlinkDecision::Drop);
        }
        let Some(app_key) = record.app_key else {
            debug!(dev_eui = %dev_eui, "Join from device without AppKey");
            return Ok(DownlinkDecision::Drop);
        };
        if !request.verify_mic(&app_key) {
            debug!(dev_eui = %dev_eui, "Join-Request MIC check failed");
            return Ok(DownlinkDecision::Drop);
        }

        let nonce_key = dev_nonce_key(dev_eui, request.dev_nonce);
        let nonce_fresh = self
            .cache
            .set(&nonce_key, gateway_id.as_str(), self.config.dev_nonce_ttl, true)
            .await?;
        if !nonce_fresh {
            warn!(dev_eui = %dev_eui, dev_nonce = %request.dev_nonce, "DevNonce already used");
            return Ok(DownlinkDecision::Drop);
        }

        let outcome = self.accept_join(&record, &request, &app_key, gateway_id).await;
        if outcome.is_err() {
            // Free the nonce for the retry
            if let Err(e) = self.cache.delete(&nonce_key).await {
                warn!(dev_eui = %dev_eui, dev_nonce = %request.dev_nonce, error = %e, "Failed to release DevNonce");
            }
        }
        outcome
    }

    async fn accept_join(
        &self,
        record: &DeviceRecord,
        request: &JoinRequest,
        app_key: &AppKey,
        gateway_id: &GatewayId,
    ) -> Result<DownlinkDecision> {
        let dev_eui = record.dev_eui;
        let (app_nonce, random_addr) = {
            let mut rng = rand::thread_rng();
            (AppNonce(rng.gen::<u32>() & 0x00FF_FFFF), rng.gen::<u32>())
        };
        let net_id = self.config.net_id;
        let dev_addr = record
            .fixed_dev_addr
            .unwrap_or_else(|| DevAddr::from_parts(net_id.nwk_id(), random_addr));

        let keys = derive_session_keys(app_nonce, net_id, request.dev_nonce, app_key);
        let accept = JoinAccept::new(
            app_nonce,
            net_id,
            dev_addr,
            JOIN_DL_SETTINGS,
            JOIN_RX_DELAY,
            None,
            app_key,
        );
        let wire = accept.encrypt(app_key)?.encode();

        // Counters restart with the new session
        self.states.reset(dev_eui).await?;

        let downlink_sent = self.send(&wire, gateway_id, dev_eui).await;
        info!(dev_eui = %dev_eui, dev_addr = %dev_addr, gateway_id = %gateway_id, "Device joined");

        Ok(DownlinkDecision::JoinAccepted {
            dev_eui,
            dev_addr,
            session: DeviceSession {
                dev_addr,
                keys,
                fcnt_up: 0,
                fcnt_down: 0,
            },
            downlink_sent,
        })
    }

    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Find the device holding `frame.dev_addr` whose NwkSKey signs the frame.
    /// Returns the record and the full 32-bit counter the MIC verified with.
    async fn authenticate(&self, frame: &DataFrame) -> Result<Option<(DeviceRecord, DeviceSession, u32)>> {
        let candidates = self
            .registry
            .lookup_by_dev_addr(frame.dev_addr)
            .await
            .map_err(CoordinatorError::Registry)?;

        for record in candidates {
            let Some(session) = record.session.clone() else {
                continue;
            };

            let fcnt_up = if record.supports_32bit_fcnt {
                let last = match self.states.read(record.dev_eui).await? {
                    Some(state) => state.fcnt_up,
                    None => session.fcnt_up,
                };
                reconstruct_fcnt(last, frame.fcnt)
            } else {
                u32::from(frame.fcnt)
            };

            if frame.verify_mic(&session.keys.nwk_s_key, fcnt_up) {
                return Ok(Some((record, session, fcnt_up)));
            }
        }
        Ok(None)
    }

    async fn handle_data(&self, frame: DataFrame, gateway_id: &GatewayId, rssi: f64) -> Result<DownlinkDecision> {
        let Some((record, session, fcnt_up)) = self.authenticate(&frame).await? else {
            debug!(dev_addr = %frame.dev_addr, gateway_id = %gateway_id, "No device verified the MIC");
            return Ok(DownlinkDecision::Drop);
        };
        let dev_eui = record.dev_eui;
        let confirmed = frame.is_confirmed();
        let preferred_mode = record.uses_preferred_gateway();

        let mut items = FunctionItems::DEDUPLICATION;
        if confirmed {
            items = items | FunctionItems::FCNT_DOWN;
        }
        if self.adr_enabled && frame.fctrl.adr() {
            items = items | FunctionItems::ADR;
        }
        if preferred_mode {
            items = items | FunctionItems::PREFERRED_GATEWAY;
        }

        let result = self
            .bundler
            .execute(BundlerRequest {
                dev_eui,
                gateway_id: gateway_id.clone(),
                client_fcnt_up: fcnt_up,
                client_fcnt_down: session.fcnt_down,
                rssi,
                adr_request: Some(AdrRequest {
                    fcnt_up,
                    fcnt_down: session.fcnt_down,
                    rssi,
                    adr_ack_requested: frame.fctrl.adr_ack_req(),
                }),
                items,
            })
            .await?;

        if let Some(dedup) = &result.deduplication {
            if dedup.is_duplicate {
                debug!(
                    dev_eui = %dev_eui,
                    gateway_id = %gateway_id,
                    owner = %dedup.owning_gateway_id,
                    fcnt_up,
                    "Duplicate uplink"
                );
                return Ok(DownlinkDecision::Duplicate {
                    owner: dedup.owning_gateway_id.clone(),
                });
            }
        }

        let payload = frame.decrypt_payload(&session.keys, fcnt_up);

        // Preferred-gateway devices are answered through the elected gateway
        let downlink_gateway = result
            .preferred_gateway
            .as_ref()
            .filter(|_| preferred_mode)
            .and_then(|pg| pg.preferred_gateway_id.clone())
            .unwrap_or_else(|| gateway_id.clone());

        let mut downlink_sent = false;
        match result.next_fcnt_down {
            Some(fcnt_down) if confirmed => {
                let ack = DataFrame::ack(session.dev_addr, fcnt_down, &session.keys)?.encode()?;
                downlink_sent = self.send(&ack, &downlink_gateway, dev_eui).await;
            }
            None if confirmed => {
                debug!(dev_eui = %dev_eui, gateway_id = %gateway_id, "No FCntDown issued; skipping ACK");
            }
            _ => {}
        }

        debug!(dev_eui = %dev_eui, gateway_id = %gateway_id, fcnt_up, confirmed, "Uplink accepted");

        Ok(DownlinkDecision::Accepted {
            dev_eui,
            fcnt_up,
            next_fcnt_down: result.next_fcnt_down,
            payload: UplinkPayload::from(&payload),
            downlink_sent,
            preferred_gateway: result.preferred_gateway,
        })
    }

    /// Send a frame, logging rather than failing on transport errors
    async fn send(&self, frame: &[u8], gateway_id: &GatewayId, dev_eui: DevEui) -> bool {
        match self.downlinks.send_downlink(frame, gateway_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(dev_eui = %dev_eui, gateway_id = %gateway_id, error = %e, "Downlink send failed");
                false
            }
        }
    }
}
