//! Multi-gateway uplink coordination for the LoRaWAN network server.
//!
//! Several gateways may receive the same uplink. Each gateway process calls
//! [`NetworkServer::handle_uplink`] with its copy; the shared cache decides
//! which copy is authoritative, which downlink counter to use, and (for
//! Class C devices without a home gateway) which gateway should carry
//! downlinks.
//!
//! Cache layout per device:
//!
//! | Key                               | Owner                         |
//! |-----------------------------------|-------------------------------|
//! | `{devEUI}`                        | [`DeviceStateCache`]          |
//! | `{devEUI}:devicelock`             | [`DeviceStateCache`]          |
//! | `preferredGateway:{devEUI}`       | [`PreferredGatewayResolver`]  |
//! | `preferredGateway:{devEUI}:{fcnt}`| [`PreferredGatewayResolver`]  |
//! | `preferredGateway:{devEUI}:lock`  | [`PreferredGatewayResolver`]  |
//! | `devnonce:{devEUI}:{devNonce}`    | join handling                 |

pub mod adr;
pub mod bundler;
pub mod config;
pub mod dedup;
pub mod device_state;
pub mod errors;
pub mod fcnt_down;
pub mod preferred_gateway;
pub mod registry;
pub mod transport;
pub mod uplink;

pub use adr::{AdrCalculator, AdrRequest, AdrResult};
pub use bundler::{BundlerRequest, BundlerResult, FunctionBundler, FunctionItems};
pub use config::CoordinatorConfig;
pub use dedup::{DeduplicationCoordinator, DeduplicationResult, UNKNOWN_OWNER};
pub use device_state::{CachedDeviceState, DeviceStateCache};
pub use errors::{CoordinatorError, Result};
pub use fcnt_down::FrameCounterPolicy;
pub use preferred_gateway::{
    PreferredGateway, PreferredGatewayResolver, PreferredGatewayResult, PreferredGatewayTableItem,
};
pub use registry::{DeviceClass, DeviceRecord, DeviceRegistry, DeviceSession, InMemoryDeviceRegistry};
pub use transport::{ConnectionControl, DownlinkSender, NoopConnectionControl};
pub use uplink::{DownlinkDecision, NetworkServer, NetworkServerBuilder, UplinkPayload};
