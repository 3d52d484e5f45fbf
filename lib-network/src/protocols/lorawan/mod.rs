//! LoRaWAN 1.0.x PHYPayload codec
//!
//! - `mhdr`: message header and message types
//! - `join_request` / `join_accept`: OTAA join messages
//! - `data`: confirmed and unconfirmed data frames
//! - `fcnt`: 16 → 32 bit frame-counter reconstruction
//!
//! [`Frame::decode`] dispatches on the MHDR message type. Decoding never
//! checks a MIC; that needs keys the codec does not own.

pub mod data;
pub mod errors;
pub mod fcnt;
pub mod join_accept;
pub mod join_request;
pub mod mhdr;

use lib_types::Direction;

pub use data::{DataFrame, FCtrl, FOpts, FramePayload, MAX_FOPTS_LENGTH};
pub use errors::{DecodeError, EncodeError};
pub use fcnt::reconstruct_fcnt;
pub use join_accept::{EncryptedJoinAccept, JoinAccept};
pub use join_request::JoinRequest;
pub use mhdr::{MType, Mhdr};

/// Any frame a LoRaWAN 1.0.x network server handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    JoinRequest(JoinRequest),
    JoinAccept(EncryptedJoinAccept),
    DataUp(DataFrame),
    DataDown(DataFrame),
}

impl Frame {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let first = bytes.first().ok_or(DecodeError::Empty)?;

        match Mhdr::from_byte(*first).mtype()? {
            MType::JoinRequest => JoinRequest::decode(bytes).map(Frame::JoinRequest),
            MType::JoinAccept => EncryptedJoinAccept::decode(bytes).map(Frame::JoinAccept),
            MType::UnconfirmedDataUp | MType::ConfirmedDataUp => {
                DataFrame::decode(bytes).map(Frame::DataUp)
            }
            MType::UnconfirmedDataDown | MType::ConfirmedDataDown => {
                DataFrame::decode(bytes).map(Frame::DataDown)
            }
        }
    }

    /// Serialize; fails if a data frame's variant disagrees with its MHDR
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            Frame::JoinRequest(request) => Ok(request.encode()),
            Frame::JoinAccept(accept) => Ok(accept.encode()),
            Frame::DataUp(frame) | Frame::DataDown(frame) => {
                let expected_direction = match self {
                    Frame::DataDown(_) => Direction::Downlink,
                    _ => Direction::Uplink,
                };
                let is_data = matches!(frame.mhdr.mtype(), Ok(mtype) if mtype.is_data());
                if !is_data || frame.direction() != expected_direction {
                    return Err(EncodeError::MessageTypeMismatch(frame.mhdr.mtype_bits()));
                }
                frame.encode()
            }
        }
    }

    pub fn mhdr(&self) -> Mhdr {
        match self {
            Frame::JoinRequest(request) => request.mhdr,
            Frame::JoinAccept(accept) => accept.mhdr,
            Frame::DataUp(frame) | Frame::DataDown(frame) => frame.mhdr,
        }
    }
}
