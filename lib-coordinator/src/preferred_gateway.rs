//! Preferred gateway election for Class C devices without a home gateway
//!
//! Every gateway that hears an uplink reports its RSSI, waits out a short
//! collection window, then either picks up an already elected winner or
//! competes for a short election lock and elects one itself:
//!
//! ```text
//!   append "{gw};{rssi}" ──► wait window ──► resolved fcnt ≥ ours? ──► done
//!                                                  │ no
//!                                                  ▼
//!                        take lock (≤ N tries) ──► max RSSI ──► store winner
//! ```
//!
//! | Key                                   | Value                           |
//! |---------------------------------------|---------------------------------|
//! | `preferredGateway:{devEUI}:{fcntUp}`  | list of `"{gw};{rssi}"`         |
//! | `preferredGateway:{devEUI}`           | `"{gw};{fcntUp};{unixSeconds}"` |
//! | `preferredGateway:{devEUI}:lock`      | lock token                      |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lib_storage::{CacheLock, CacheStore};
use lib_types::{DevEui, GatewayId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::device_state::unix_now;
use crate::errors::{CoordinatorError, Result};

const UNRESOLVED: &str = "Could not resolve closest gateway in cache";

pub fn preferred_gateway_key(dev_eui: DevEui) -> String {
    format!("preferredGateway:{}", dev_eui)
}

pub fn preferred_gateway_lock_key(dev_eui: DevEui) -> String {
    format!("preferredGateway:{}:lock", dev_eui)
}

pub fn preferred_gateway_candidates_key(dev_eui: DevEui, fcnt_up: u32) -> String {
    format!("preferredGateway:{}:{}", dev_eui, fcnt_up)
}

// ============================================================================
// Cached string encodings
// ============================================================================

/// One gateway's report for an uplink: `"{GatewayID};{Rssi}"`
#[derive(Debug, Clone, PartialEq)]
pub struct PreferredGatewayTableItem {
    pub gateway_id: GatewayId,
    pub rssi: f64,
}

impl fmt::Display for PreferredGatewayTableItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.gateway_id, self.rssi)
    }
}

impl FromStr for PreferredGatewayTableItem {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (gateway_id, rssi) = s
            .rsplit_once(';')
            .ok_or_else(|| format!("missing ';' in '{}'", s))?;
        let rssi = rssi
            .parse()
            .map_err(|e| format!("bad RSSI in '{}': {}", s, e))?;
        Ok(Self {
            gateway_id: GatewayId::from(gateway_id),
            rssi,
        })
    }
}

/// Elected gateway for a device: `"{GatewayID};{FcntUp};{UpdateTimeUnixSeconds}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferredGateway {
    pub gateway_id: GatewayId,
    pub fcnt_up: u32,
    pub updated_at: u64,
}

impl fmt::Display for PreferredGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.gateway_id, self.fcnt_up, self.updated_at)
    }
}

impl FromStr for PreferredGateway {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ';');
        let (Some(updated_at), Some(fcnt_up), Some(gateway_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected 3 fields in '{}'", s));
        };

        Ok(Self {
            gateway_id: GatewayId::from(gateway_id),
            fcnt_up: fcnt_up
                .parse()
                .map_err(|e| format!("bad fcnt in '{}': {}", s, e))?,
            updated_at: updated_at
                .parse()
                .map_err(|e| format!("bad timestamp in '{}': {}", s, e))?,
        })
    }
}

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferredGatewayResult {
    pub dev_eui: DevEui,
    /// FCntUp the caller asked about
    pub request_fcnt_up: u32,
    /// FCntUp the returned winner was elected for
    pub current_fcnt_up: Option<u32>,
    pub preferred_gateway_id: Option<GatewayId>,
    /// A newer uplink's election finished first
    pub conflict: bool,
    pub error_message: Option<String>,
}

impl PreferredGatewayResult {
    fn resolved(dev_eui: DevEui, request_fcnt_up: u32, winner: &PreferredGateway) -> Self {
        Self {
            dev_eui,
            request_fcnt_up,
            current_fcnt_up: Some(winner.fcnt_up),
            preferred_gateway_id: Some(winner.gateway_id.clone()),
            conflict: winner.fcnt_up != request_fcnt_up,
            error_message: None,
        }
    }

    fn failed(dev_eui: DevEui, request_fcnt_up: u32, message: impl Into<String>) -> Self {
        Self {
            dev_eui,
            request_fcnt_up,
            current_fcnt_up: None,
            preferred_gateway_id: None,
            conflict: false,
            error_message: Some(message.into()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.preferred_gateway_id.is_some()
    }
}

/// Highest RSSI; on equal RSSI the earliest report wins
pub fn select_winner(candidates: &[PreferredGatewayTableItem]) -> Option<&PreferredGatewayTableItem> {
    candidates.iter().fold(None, |best, item| match best {
        Some(current) if current.rssi >= item.rssi => Some(current),
        _ => Some(item),
    })
}

// ============================================================================
// Resolver
// ============================================================================

pub struct PreferredGatewayResolver {
    cache: Arc<dyn CacheStore>,
    config: CoordinatorConfig,
}

impl PreferredGatewayResolver {
    pub fn new(cache: Arc<dyn CacheStore>, config: CoordinatorConfig) -> Self {
        Self { cache, config }
    }

    /// Report `rssi` for this uplink and return the elected gateway.
    ///
    /// Suspends for the collection window. A result without a winner
    /// carries `error_message`; cache failures propagate as errors.
    pub async fn resolve(
        &self,
        dev_eui: DevEui,
        fcnt_up: u32,
        gateway_id: &GatewayId,
        rssi: f64,
    ) -> Result<PreferredGatewayResult> {
        let candidates_key = preferred_gateway_candidates_key(dev_eui, fcnt_up);
        let item = PreferredGatewayTableItem {
            gateway_id: gateway_id.clone(),
            rssi,
        };
        self.cache
            .list_append(&candidates_key, &item.to_string(), self.config.preferred_gateway_list_ttl)
            .await?;

        tokio::time::sleep(self.config.preferred_gateway_receive_interval).await;

        if let Some(result) = self.already_resolved(dev_eui, fcnt_up).await? {
            return Ok(result);
        }

        for attempt in 1..=self.config.preferred_gateway_max_attempts {
            let lock = CacheLock::acquire(
                Arc::clone(&self.cache),
                preferred_gateway_lock_key(dev_eui),
                gateway_id.as_str(),
                self.config.preferred_gateway_lock_ttl,
                false,
            )
            .await?;

            if let Some(lock) = lock {
                let outcome = self.elect(dev_eui, fcnt_up, &candidates_key).await;
                lock.release().await?;
                return outcome;
            }

            debug!(dev_eui = %dev_eui, fcnt_up, attempt, "Election lock contested");
            tokio::time::sleep(self.config.preferred_gateway_retry_delay()).await;

            if let Some(result) = self.already_resolved(dev_eui, fcnt_up).await? {
                return Ok(result);
            }
        }

        warn!(dev_eui = %dev_eui, fcnt_up, "Preferred gateway election gave up");
        Ok(PreferredGatewayResult::failed(dev_eui, fcnt_up, UNRESOLVED))
    }

    /// Runs under the election lock
    async fn elect(&self, dev_eui: DevEui, fcnt_up: u32, candidates_key: &str) -> Result<PreferredGatewayResult> {
        if let Some(result) = self.already_resolved(dev_eui, fcnt_up).await? {
            return Ok(result);
        }

        let candidates: Vec<PreferredGatewayTableItem> = self
            .cache
            .list_read(candidates_key)
            .await?
            .iter()
            .filter_map(|raw| match raw.parse::<PreferredGatewayTableItem>() {
                Ok(item) => Some(item),
                Err(reason) => {
                    warn!(key = %candidates_key, reason = %reason, "Skipping malformed RSSI report");
                    None
                }
            })
            .collect();

        let Some(best) = select_winner(&candidates) else {
            warn!(dev_eui = %dev_eui, fcnt_up, "No gateway candidates in cache");
            return Ok(PreferredGatewayResult::failed(dev_eui, fcnt_up, UNRESOLVED));
        };

        let winner = PreferredGateway {
            gateway_id: best.gateway_id.clone(),
            fcnt_up,
            updated_at: unix_now(),
        };
        self.cache
            .set(&preferred_gateway_key(dev_eui), &winner.to_string(), None, false)
            .await?;

        info!(
            dev_eui = %dev_eui,
            fcnt_up,
            gateway_id = %winner.gateway_id,
            rssi = best.rssi,
            candidates = candidates.len(),
            "Preferred gateway elected"
        );
        Ok(PreferredGatewayResult::resolved(dev_eui, fcnt_up, &winner))
    }

    /// Current election if it covers `fcnt_up` or a newer uplink
    async fn already_resolved(&self, dev_eui: DevEui, fcnt_up: u32) -> Result<Option<PreferredGatewayResult>> {
        Ok(self
            .current(dev_eui)
            .await?
            .filter(|winner| winner.fcnt_up >= fcnt_up)
            .map(|winner| PreferredGatewayResult::resolved(dev_eui, fcnt_up, &winner)))
    }

    /// Last elected gateway for a device
    pub async fn current(&self, dev_eui: DevEui) -> Result<Option<PreferredGateway>> {
        let key = preferred_gateway_key(dev_eui);
        match self.cache.get(&key).await? {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|reason| CoordinatorError::CorruptCacheValue { key, reason }),
        }
    }
}
