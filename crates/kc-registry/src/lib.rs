//! # kc-registry
//!
//! The realm resource registry: uniqueness-enforced creation of clients and
//! roles, cache-backed lookups, and cross-node cache invalidation.
//!
//! Uniqueness is decided by the store's unique constraint. The per-key
//! [`KeyLocks`] only keep colliding creates on one node from all hitting
//! the store at once.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kc_model::{Attributes, Realm, ResourceScope, ResourceType};
//! use kc_registry::ResourceRegistry;
//! use kc_storage::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let registry = ResourceRegistry::new(Arc::new(store.realms()), Arc::new(store.resources()));
//! let realm = registry.create_realm(Realm::new("acme")).await?;
//! let client = registry
//!     .create_resource(ResourceScope::realm(realm.id), ResourceType::Client, "web", Attributes::new())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod locks;
pub mod registry;
pub mod stress;
pub mod validation;

pub use error::{RegistryError, RegistryResult};
pub use locks::{KeyGuard, KeyLocks};
pub use registry::ResourceRegistry;
pub use stress::{
    run_stress, ContendedCreateTask, CountdownLatch, CreateClientsTask, CreateRolesTask,
    StressConfig, StressFailure, StressReport, StressTask,
};
pub use validation::{validate_name, MAX_NAME_LENGTH};
