//! Cache backends
//!
//! - `traits`: the [`CacheStore`] capability the coordinator is written against
//! - `memory`: in-process implementation
//! - `lock`: scoped lock guard over any [`CacheStore`]

pub mod lock;
pub mod memory;
pub mod traits;

pub use lock::CacheLock;
pub use memory::InMemoryCacheStore;
pub use traits::CacheStore;
