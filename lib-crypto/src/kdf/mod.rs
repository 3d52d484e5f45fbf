//! Key derivation

pub mod session_keys;

pub use session_keys::{derive_session_key, derive_session_keys, SessionKeyType};
