//! AES-128 key newtypes.
//!
//! Root and session keys are distinct types so a NwkSKey can never be passed
//! where an AppSKey is expected. `Debug` output is redacted; keys are only
//! rendered as hex through [`AppKey::to_hex`] and friends, which callers use
//! for provisioning output, never for logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::conversion::{bytes_to_hex, hex_to_array};
use crate::errors::ConversionError;

/// AES-128 key size in bytes
pub const KEY_LENGTH: usize = 16;

macro_rules! aes_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; KEY_LENGTH]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                bytes_to_hex(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(..)", stringify!($name))
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(hex_to_array(s)?))
            }
        }

        impl From<[u8; KEY_LENGTH]> for $name {
            fn from(bytes: [u8; KEY_LENGTH]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

aes_key!(
    /// Pre-shared root key used for OTAA joins
    AppKey
);

aes_key!(
    /// Network session key: MIC and FPort 0 payload encryption
    NwkSKey
);

aes_key!(
    /// Application session key: FRMPayload encryption for FPort > 0
    AppSKey
);

/// Keys derived once per join and held for the life of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeys {
    pub nwk_s_key: NwkSKey,
    pub app_s_key: AppSKey,
}
