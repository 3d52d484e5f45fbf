//! LoRaWAN Cryptography Engine
//!
//! AES-128 based primitives for a LoRaWAN 1.0.x network server:
//!
//! - `mic`: AES-CMAC message integrity codes (join and data frames)
//! - `payload`: FRMPayload keystream encryption (encrypt == decrypt)
//! - `symmetric`: single-block AES and the Join-Accept cipher
//! - `kdf`: NwkSKey / AppSKey derivation from AppKey and join nonces
//!
//! Functions here work on typed keys and raw byte slices. They know nothing
//! about frame layout; the codec in `lib-network` decides which bytes are
//! authenticated and which key applies.

pub mod errors;
pub mod kdf;
pub mod mic;
pub mod payload;
pub mod symmetric;

pub use errors::CryptoError;
pub use kdf::{derive_session_key, derive_session_keys, SessionKeyType};
pub use mic::{aes_cmac, compute_data_mic, compute_join_mic};
pub use payload::crypt_frm_payload;
pub use symmetric::{decrypt_join_accept, encrypt_join_accept};
