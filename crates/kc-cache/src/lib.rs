//! # kc-cache
//!
//! Per-process resource cache and the invalidation bus that keeps caches on
//! different nodes converging.
//!
//! - [`ResourceCache`] - resources by ID and key, plus list results
//! - [`InvalidationBus`] - transport for [`InvalidationMessage`]s
//! - [`LocalInvalidationBus`] - in-process bus; Redis lives in `kc-cache-redis`
//!
//! The cache is never authoritative. Uniqueness is decided by the store.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod invalidation;
pub mod resource;

pub use error::{CacheError, CacheResult};
pub use invalidation::{
    InvalidationBus, InvalidationEvent, InvalidationMessage, InvalidationStream,
    LocalInvalidationBus, DEFAULT_CHANNEL_CAPACITY,
};
pub use resource::{CacheEpoch, CacheStats, ResourceCache, ResourceCacheConfig};
