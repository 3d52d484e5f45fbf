//! Shared cache layer for the LoRaWAN network server.
//!
//! Multi-gateway coordination needs one cache visible to every gateway
//! process: TTL strings for device state, append-only lists for RSSI
//! collection and token locks for mutual exclusion. This crate defines that
//! capability and ships an in-process implementation.

pub mod backend;
pub mod errors;
pub mod types;

pub use backend::{CacheLock, CacheStore, InMemoryCacheStore};
pub use errors::{CacheError, Result};
pub use types::CacheConfig;
