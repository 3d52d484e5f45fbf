//! LoRaWAN network server node
//!
//! Configuration loading and the runtime that feeds received uplinks to the
//! coordination core. The gateway transport and device registry are
//! external; this crate ships in-process stand-ins for both.

pub mod config;
pub mod runtime;
