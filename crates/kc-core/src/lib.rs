//! # kc-core
//!
//! Core utilities, configuration, and error handling shared by the
//! registry crates.
//!
//! - [`config`] - node, database, cache and registry settings
//! - [`error`] - configuration and startup errors
//! - [`event`] - structured admin events
//! - [`logging`] - tracing subscriber setup

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;

pub use config::{CacheConfig, Config, DatabaseConfig, NodeConfig, RegistrySettings};
pub use error::{Error, Result};
pub use logging::init_tracing;
