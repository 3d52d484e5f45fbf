//! Cache type definitions

pub mod config_types;

pub use config_types::CacheConfig;
