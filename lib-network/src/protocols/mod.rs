//! Radio protocol codecs

pub mod lorawan;

pub use self::lorawan::{
    DataFrame, DecodeError, EncodeError, EncryptedJoinAccept, FCtrl, FOpts, Frame, FramePayload,
    JoinAccept, JoinRequest, MType, Mhdr,
};
