//! # kc-storage
//!
//! Storage abstraction traits for the Keycloak resource registry.
//!
//! This crate defines the storage provider interfaces implemented by
//! concrete backends (see `kc-storage-sql`), plus a transactional
//! in-memory backend used by tests and single-node deployments.
//!
//! ## Provider Traits
//!
//! - [`RealmProvider`] - realm lifecycle
//! - [`ResourceProvider`] - uniqueness-enforced client and role storage
//!
//! ## Backends
//!
//! - [`MemoryStore`] - in-memory store with fault injection

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod realm;
pub mod resource;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryRealmProvider, MemoryResourceProvider, MemoryStore};
pub use realm::RealmProvider;
pub use resource::ResourceProvider;
