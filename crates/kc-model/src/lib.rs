//! # kc-model
//!
//! Domain models for the Keycloak resource registry.
//!
//! This crate defines the entities the registry manages: realms, and the
//! named resources (clients and roles) that live inside them.
//!
//! ## Uniqueness
//!
//! Every resource is named uniquely within its [`ResourceScope`] and
//! [`ResourceType`]. The composite [`UniquenessKey`] is the value storage
//! backends enforce a unique constraint on.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod realm;
pub mod resource;

pub use realm::Realm;
pub use resource::{
    Attributes, Resource, ResourceLookup, ResourceScope, ResourceType, ScopeOwner,
    UniquenessKey,
};
