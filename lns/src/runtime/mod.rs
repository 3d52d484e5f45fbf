//! Node runtime
//!
//! Wires configuration into a [`NetworkServer`] and drives it from a line
//! stream. Each input line is one received uplink:
//!
//! ```text
//! <gateway-id> <rssi> <hex-frame>
//! ```
//!
//! A gateway id of `-` means this node's configured gateway. Each decision
//! is written back as one JSON line. Blank lines and `#` comments are
//! skipped.

pub mod supervisor;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lib_coordinator::{DownlinkDecision, DownlinkSender, InMemoryDeviceRegistry, NetworkServer};
use lib_storage::{CacheStore, InMemoryCacheStore};
use lib_types::conversion::{bytes_to_hex, hex_to_bytes};
use lib_types::GatewayId;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::config::NodeConfig;
pub use supervisor::PacketForwarderSupervisor;

/// Downlink transport that only logs; the gateway socket is external
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDownlinkSender;

#[async_trait]
impl DownlinkSender for TracingDownlinkSender {
    async fn send_downlink(&self, frame: &[u8], gateway_id: &GatewayId) -> Result<()> {
        info!(gateway_id = %gateway_id, frame = %bytes_to_hex(frame), "Downlink");
        Ok(())
    }
}

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayLine {
    pub gateway_id: GatewayId,
    pub rssi: f64,
    pub frame: Vec<u8>,
}

impl ReplayLine {
    /// `Ok(None)` for blank lines and comments
    pub fn parse(line: &str, default_gateway: &GatewayId) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut fields = line.split_whitespace();
        let (Some(gateway), Some(rssi), Some(frame)) = (fields.next(), fields.next(), fields.next()) else {
            bail!("expected '<gateway-id> <rssi> <hex-frame>'");
        };
        if fields.next().is_some() {
            bail!("unexpected trailing fields");
        }

        let gateway_id = match gateway {
            "-" => default_gateway.clone(),
            id => GatewayId::from(id),
        };
        let rssi = rssi.parse::<f64>().with_context(|| format!("invalid RSSI '{}'", rssi))?;
        let frame = hex_to_bytes(frame).map_err(|e| anyhow!("invalid frame hex: {}", e))?;

        Ok(Some(Self { gateway_id, rssi, frame }))
    }
}

/// Output line for input that could not be processed
#[derive(Debug, Serialize)]
struct ErrorLine {
    decision: &'static str,
    line: usize,
    retryable: bool,
    message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub processed: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub joins: usize,
    pub errors: usize,
}

pub struct NodeRuntime {
    gateway_id: GatewayId,
    registry: Arc<InMemoryDeviceRegistry>,
    server: NetworkServer,
}

impl NodeRuntime {
    /// Runtime over a fresh in-process cache
    pub fn new(config: &NodeConfig) -> Self {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new(config.cache.clone()));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: &NodeConfig, cache: Arc<dyn CacheStore>) -> Self {
        let registry = Arc::new(InMemoryDeviceRegistry::new(config.devices.iter().cloned()));
        let server = NetworkServer::builder(cache, registry.clone(), Arc::new(TracingDownlinkSender))
            .config(config.coordinator.clone())
            .build();

        info!(gateway_id = %config.gateway_id, devices = registry.len(), "Node runtime ready");
        Self {
            gateway_id: config.gateway_id.clone(),
            registry,
            server,
        }
    }

    pub fn server(&self) -> &NetworkServer {
        &self.server
    }

    /// Handle one uplink and keep the registry in step with joins
    pub async fn process(&self, line: &ReplayLine) -> lib_coordinator::Result<DownlinkDecision> {
        let decision = self
            .server
            .handle_uplink(&line.frame, &line.gateway_id, line.rssi)
            .await?;

        if let DownlinkDecision::JoinAccepted { dev_eui, session, .. } = &decision {
            if !self.registry.store_session(*dev_eui, session.clone()) {
                warn!(dev_eui = %dev_eui, "Joined device vanished from registry");
            }
        }
        Ok(decision)
    }

    /// Replay every line of `input`, writing one JSON decision per uplink
    pub async fn replay<R, W>(&self, input: R, mut output: W) -> Result<ReplayStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut stats = ReplayStats::default();
        let mut lines = input.lines();
        let mut number = 0;

        while let Some(raw) = lines.next_line().await.context("Failed to read input")? {
            number += 1;
            let json = match ReplayLine::parse(&raw, &self.gateway_id) {
                Ok(None) => continue,
                Ok(Some(line)) => match self.process(&line).await {
                    Ok(decision) => {
                        stats.record(&decision);
                        serde_json::to_string(&decision)?
                    }
                    Err(e) => {
                        stats.errors += 1;
                        serde_json::to_string(&ErrorLine {
                            decision: "error",
                            line: number,
                            retryable: e.is_retryable(),
                            message: e.to_string(),
                        })?
                    }
                },
                Err(e) => {
                    warn!(line = number, error = %format!("{e:#}"), "Skipping unparseable line");
                    stats.errors += 1;
                    serde_json::to_string(&ErrorLine {
                        decision: "error",
                        line: number,
                        retryable: false,
                        message: format!("{e:#}"),
                    })?
                }
            };

            output.write_all(json.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }

        Ok(stats)
    }
}

impl ReplayStats {
    fn record(&mut self, decision: &DownlinkDecision) {
        self.processed += 1;
        match decision {
            DownlinkDecision::Drop => self.dropped += 1,
            DownlinkDecision::Duplicate { .. } => self.duplicates += 1,
            DownlinkDecision::Accepted { .. } => self.accepted += 1,
            DownlinkDecision::JoinAccepted { .. } => self.joins += 1,
        }
    }
}
