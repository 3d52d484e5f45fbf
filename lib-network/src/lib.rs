//! LoRaWAN wire codec.
//!
//! Decodes and encodes every LoRaWAN 1.0.x message a network server sees:
//! Join-Request, Join-Accept and data frames in both directions. MIC
//! computation and payload encryption are delegated to `lib-crypto`; this
//! crate decides which bytes they cover.

pub mod protocols;

pub use protocols::lorawan::{fcnt::reconstruct_fcnt, MAX_FOPTS_LENGTH};
pub use protocols::{
    DataFrame, DecodeError, EncodeError, EncryptedJoinAccept, FCtrl, FOpts, Frame, FramePayload,
    JoinAccept, JoinRequest, MType, Mhdr,
};
