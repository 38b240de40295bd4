//! # kc-federation
//!
//! Attribute mapping for resources backed by an external directory.
//!
//! Mapper types are provided by [`AttributeMapperFactory`] implementations.
//! A [`MapperRegistry`] validates each [`MapperConfig`] against its factory
//! before building and storing the mapper; a configuration missing required
//! keys is rejected with every missing key listed.
//!
//! Read-only mappers import normally but never produce export changes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod mapper;
pub mod registry;

pub use error::{FederationError, FederationResult};
pub use mapper::{
    AttributeMapper, AttributeMapperFactory, ConfigProperty, ConfigPropertyType, FullNameMapper,
    FullNameMapperFactory, MapperConfig, SyncDirection, UserAttributeMapper,
    UserAttributeMapperFactory,
};
pub use registry::{MapperRegistry, RegisteredMapper};
