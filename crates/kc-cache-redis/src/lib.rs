//! # kc-cache-redis
//!
//! Redis pub/sub transport for cache invalidation, built on `fred`.
//!
//! ## Example
//!
//! ```ignore
//! use kc_cache::InvalidationBus;
//! use kc_cache_redis::{RedisConfig, RedisInvalidationBus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = RedisInvalidationBus::connect(&RedisConfig::from_url("redis://localhost:6379")).await?;
//!     let mut stream = bus.subscribe();
//!     while let Ok(message) = stream.recv().await {
//!         println!("{:?}", message.event);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bus;
pub mod config;
pub mod error;

pub use bus::{RedisInvalidationBus, BUS_ORIGIN};
pub use config::RedisConfig;
