//! Per-uplink coordination pipeline
//!
//! One request runs the selected steps in priority order against the
//! shared cache:
//!
//! | Priority | Step              | On abort                       |
//! |----------|-------------------|--------------------------------|
//! | 1        | Deduplication     | aborts on duplicate            |
//! | 2        | ADR               | skipped                        |
//! | 3        | FCntDown          | skipped                        |
//! | 4        | PreferredGateway  | still runs (RSSI must count)   |

use std::ops::BitOr;
use std::sync::Arc;

use async_trait::async_trait;
use lib_types::{DevEui, GatewayId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::adr::{AdrCalculator, AdrRequest, AdrResult};
use crate::dedup::{DeduplicationCoordinator, DeduplicationResult};
use crate::errors::Result;
use crate::fcnt_down::FrameCounterPolicy;
use crate::preferred_gateway::{PreferredGatewayResolver, PreferredGatewayResult};

/// Set of pipeline steps a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FunctionItems(u8);

impl FunctionItems {
    pub const NONE: Self = Self(0);
    pub const DEDUPLICATION: Self = Self(0x01);
    pub const ADR: Self = Self(0x02);
    pub const FCNT_DOWN: Self = Self(0x04);
    pub const PREFERRED_GATEWAY: Self = Self(0x08);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FunctionItems {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundlerRequest {
    pub dev_eui: DevEui,
    pub gateway_id: GatewayId,
    pub client_fcnt_up: u32,
    pub client_fcnt_down: u32,
    pub rssi: f64,
    pub adr_request: Option<AdrRequest>,
    pub items: FunctionItems,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BundlerResult {
    pub deduplication: Option<DeduplicationResult>,
    pub adr: Option<AdrResult>,
    pub next_fcnt_down: Option<u32>,
    pub preferred_gateway: Option<PreferredGatewayResult>,
}

/// Request and accumulated result shared by the steps
pub struct PipelineContext {
    pub request: BundlerRequest,
    pub result: BundlerResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Continue,
    Abort,
}

#[async_trait]
pub trait ExecutionItem: Send + Sync {
    fn priority(&self) -> u8;

    fn needs_to_execute(&self, items: FunctionItems) -> bool;

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<ExecutionOutcome>;

    /// Called instead of `execute` once an earlier step aborted
    async fn on_abort(&self, _ctx: &mut PipelineContext) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Steps
// ============================================================================

pub struct DeduplicationItem {
    coordinator: Arc<DeduplicationCoordinator>,
}

#[async_trait]
impl ExecutionItem for DeduplicationItem {
    fn priority(&self) -> u8 {
        1
    }

    fn needs_to_execute(&self, items: FunctionItems) -> bool {
        items.contains(FunctionItems::DEDUPLICATION)
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<ExecutionOutcome> {
        let request = &ctx.request;
        let result = self
            .coordinator
            .resolve(
                request.dev_eui,
                &request.gateway_id,
                request.client_fcnt_up,
                request.client_fcnt_down,
            )
            .await?;

        let outcome = if result.is_duplicate {
            ExecutionOutcome::Abort
        } else {
            ExecutionOutcome::Continue
        };
        ctx.result.deduplication = Some(result);
        Ok(outcome)
    }
}

pub struct AdrItem {
    calculator: Arc<dyn AdrCalculator>,
}

#[async_trait]
impl ExecutionItem for AdrItem {
    fn priority(&self) -> u8 {
        2
    }

    fn needs_to_execute(&self, items: FunctionItems) -> bool {
        items.contains(FunctionItems::ADR)
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<ExecutionOutcome> {
        let Some(adr_request) = &ctx.request.adr_request else {
            return Ok(ExecutionOutcome::Continue);
        };

        match self
            .calculator
            .calculate(ctx.request.dev_eui, &ctx.request.gateway_id, adr_request)
            .await
        {
            Ok(adr) => {
                if let Some(fcnt_down) = adr.fcnt_down {
                    ctx.result.next_fcnt_down = Some(fcnt_down);
                }
                ctx.result.adr = Some(adr);
            }
            Err(e) => {
                warn!(dev_eui = %ctx.request.dev_eui, error = %e, "ADR calculation failed");
            }
        }
        Ok(ExecutionOutcome::Continue)
    }
}

pub struct FCntDownItem {
    policy: Arc<FrameCounterPolicy>,
}

#[async_trait]
impl ExecutionItem for FCntDownItem {
    fn priority(&self) -> u8 {
        3
    }

    fn needs_to_execute(&self, items: FunctionItems) -> bool {
        items.contains(FunctionItems::FCNT_DOWN)
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<ExecutionOutcome> {
        if ctx.result.next_fcnt_down.is_some() {
            debug!(dev_eui = %ctx.request.dev_eui, "Using FCntDown reserved by ADR");
            return Ok(ExecutionOutcome::Continue);
        }

        let request = &ctx.request;
        ctx.result.next_fcnt_down = self
            .policy
            .next_fcnt_down(
                request.dev_eui,
                &request.gateway_id,
                request.client_fcnt_up,
                request.client_fcnt_down,
            )
            .await?;
        Ok(ExecutionOutcome::Continue)
    }
}

pub struct PreferredGatewayItem {
    resolver: Arc<PreferredGatewayResolver>,
}

impl PreferredGatewayItem {
    async fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        let request = &ctx.request;
        let result = self
            .resolver
            .resolve(
                request.dev_eui,
                request.client_fcnt_up,
                &request.gateway_id,
                request.rssi,
            )
            .await?;
        ctx.result.preferred_gateway = Some(result);
        Ok(())
    }
}

#[async_trait]
impl ExecutionItem for PreferredGatewayItem {
    fn priority(&self) -> u8 {
        4
    }

    fn needs_to_execute(&self, items: FunctionItems) -> bool {
        items.contains(FunctionItems::PREFERRED_GATEWAY)
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<ExecutionOutcome> {
        self.run(ctx).await?;
        Ok(ExecutionOutcome::Continue)
    }

    async fn on_abort(&self, ctx: &mut PipelineContext) -> Result<()> {
        self.run(ctx).await
    }
}

// ============================================================================
// Bundler
// ============================================================================

pub struct FunctionBundler {
    items: Vec<Box<dyn ExecutionItem>>,
}

impl FunctionBundler {
    pub fn new(
        dedup: Arc<DeduplicationCoordinator>,
        fcnt_down: Arc<FrameCounterPolicy>,
        preferred_gateway: Arc<PreferredGatewayResolver>,
        adr: Option<Arc<dyn AdrCalculator>>,
    ) -> Self {
        let mut items: Vec<Box<dyn ExecutionItem>> = vec![
            Box::new(DeduplicationItem { coordinator: dedup }),
            Box::new(FCntDownItem { policy: fcnt_down }),
            Box::new(PreferredGatewayItem {
                resolver: preferred_gateway,
            }),
        ];
        if let Some(calculator) = adr {
            items.push(Box::new(AdrItem { calculator }));
        }
        items.sort_by_key(|item| item.priority());
        Self { items }
    }

    pub async fn execute(&self, request: BundlerRequest) -> Result<BundlerResult> {
        let mut ctx = PipelineContext {
            request,
            result: BundlerResult::default(),
        };
        let requested = ctx.request.items;
        let mut aborted = false;

        for item in self.items.iter().filter(|item| item.needs_to_execute(requested)) {
            if aborted {
                item.on_abort(&mut ctx).await?;
            } else if item.execute(&mut ctx).await? == ExecutionOutcome::Abort {
                debug!(
                    dev_eui = %ctx.request.dev_eui,
                    gateway_id = %ctx.request.gateway_id,
                    step = item.priority(),
                    "Pipeline aborted"
                );
                aborted = true;
            }
        }

        Ok(ctx.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::device_state::DeviceStateCache;
    use crate::transport::NoopConnectionControl;
    use lib_storage::InMemoryCacheStore;
    use parking_lot::Mutex;

    const DEV_EUI: DevEui = DevEui(0x0004_A30B_001C_0530);

    struct FixedAdr {
        fcnt_down: Option<u32>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl AdrCalculator for FixedAdr {
        async fn calculate(&self, _: DevEui, _: &GatewayId, _: &AdrRequest) -> anyhow::Result<AdrResult> {
            *self.calls.lock() += 1;
            Ok(AdrResult {
                can_confirm_to_device: true,
                data_rate: Some(5),
                fcnt_down: self.fcnt_down,
                ..AdrResult::default()
            })
        }
    }

    fn bundler(adr: Option<Arc<dyn AdrCalculator>>) -> FunctionBundler {
        let store = Arc::new(InMemoryCacheStore::default());
        let config = CoordinatorConfig::default();
        let states = DeviceStateCache::new(store.clone(), config.clone());
        FunctionBundler::new(
            Arc::new(DeduplicationCoordinator::new(
                states.clone(),
                Arc::new(NoopConnectionControl),
                config.clone(),
            )),
            Arc::new(FrameCounterPolicy::new(states)),
            Arc::new(PreferredGatewayResolver::new(store, config)),
            adr,
        )
    }

    fn request(gateway: &str, fcnt_up: u32, items: FunctionItems) -> BundlerRequest {
        BundlerRequest {
            dev_eui: DEV_EUI,
            gateway_id: GatewayId::from(gateway),
            client_fcnt_up: fcnt_up,
            client_fcnt_down: 0,
            rssi: -70.0,
            adr_request: Some(AdrRequest {
                fcnt_up,
                fcnt_down: 0,
                rssi: -70.0,
                adr_ack_requested: false,
            }),
            items,
        }
    }

    #[test]
    fn test_function_items() {
        let items = FunctionItems::DEDUPLICATION | FunctionItems::FCNT_DOWN;
        assert!(items.contains(FunctionItems::DEDUPLICATION));
        assert!(items.contains(FunctionItems::FCNT_DOWN));
        assert!(!items.contains(FunctionItems::ADR));
        assert!(FunctionItems::NONE.contains(FunctionItems::NONE));
    }

    #[tokio::test]
    async fn test_owner_gets_counter() {
        let bundler = bundler(None);
        let result = bundler
            .execute(request("gw-1", 1, FunctionItems::DEDUPLICATION | FunctionItems::FCNT_DOWN))
            .await
            .unwrap();

        assert!(!result.deduplication.unwrap().is_duplicate);
        assert_eq!(result.next_fcnt_down, Some(1));
        assert!(result.preferred_gateway.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_aborts_counter_step() {
        let bundler = bundler(None);
        let items = FunctionItems::DEDUPLICATION | FunctionItems::FCNT_DOWN;
        bundler.execute(request("gw-1", 1, items)).await.unwrap();

        let result = bundler.execute(request("gw-2", 1, items)).await.unwrap();
        assert!(result.deduplication.unwrap().is_duplicate);
        assert_eq!(result.next_fcnt_down, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferred_gateway_runs_after_abort() {
        let bundler = bundler(None);
        let items = FunctionItems::DEDUPLICATION | FunctionItems::FCNT_DOWN | FunctionItems::PREFERRED_GATEWAY;

        let (first, second) = tokio::join!(
            bundler.execute(request("gw-1", 1, items)),
            bundler.execute(request("gw-2", 1, items)),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        let duplicate = if first.deduplication.as_ref().unwrap().is_duplicate { &first } else { &second };
        assert!(duplicate.preferred_gateway.as_ref().unwrap().is_resolved());
        assert_eq!(duplicate.next_fcnt_down, None);
    }

    #[tokio::test]
    async fn test_adr_counter_takes_precedence() {
        let adr = Arc::new(FixedAdr {
            fcnt_down: Some(42),
            calls: Mutex::new(0),
        });
        let bundler = bundler(Some(adr.clone()));
        let items = FunctionItems::DEDUPLICATION | FunctionItems::ADR | FunctionItems::FCNT_DOWN;

        let result = bundler.execute(request("gw-1", 1, items)).await.unwrap();
        assert_eq!(result.next_fcnt_down, Some(42));
        assert_eq!(result.adr.unwrap().data_rate, Some(5));
        assert_eq!(*adr.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_adr_skipped_for_duplicates() {
        let adr = Arc::new(FixedAdr {
            fcnt_down: None,
            calls: Mutex::new(0),
        });
        let bundler = bundler(Some(adr.clone()));
        let items = FunctionItems::DEDUPLICATION | FunctionItems::ADR | FunctionItems::FCNT_DOWN;

        let owner = bundler.execute(request("gw-1", 1, items)).await.unwrap();
        assert_eq!(owner.next_fcnt_down, Some(1));
        bundler.execute(request("gw-2", 1, items)).await.unwrap();
        assert_eq!(*adr.calls.lock(), 1);
    }
}
