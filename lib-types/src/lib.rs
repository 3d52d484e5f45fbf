//! LoRaWAN network-server primitives.
//! Typed identifiers, key newtypes and hex helpers shared by every crate.
//!
//! Rule: no raw byte arrays for identifiers across crate boundaries.

pub mod conversion;
pub mod errors;
pub mod identifiers;
pub mod keys;

pub use errors::ConversionError;
pub use identifiers::{
    AppEui, AppNonce, DevAddr, DevEui, DevNonce, Direction, GatewayId, JoinEui, Mic, NetId,
};
pub use keys::{AppKey, AppSKey, NwkSKey, SessionKeys, KEY_LENGTH};
