//! # kc-admin-api
//!
//! Administrative operations for the Keycloak resource registry.
//!
//! [`AdminService`] exposes realm, client, role and attribute mapper
//! management over a [`kc_registry::ResourceRegistry`]. The transport that
//! carries requests to it lives elsewhere; errors carry an
//! [`AdminError::http_status`] and an [`AdminError::error_code`] so any
//! transport can report them faithfully.
//!
//! ## Operations
//!
//! | Operation | Result | Failure |
//! |-----------|--------|---------|
//! | `create_client(realm, request)` | `{id}` | `Conflict` |
//! | `get_client(realm, id)` | client | `NotFound` |
//! | `list_clients(realm)` | clients in creation order | |
//! | `create_role(realm, container, request)` | `{name}` | `Conflict` |
//! | `get_role(realm, container, name)` | role | `NotFound` |
//! | `register_mapper(mapper)` | mapper | `InvalidMapperConfig` |
//! | `sync_client_attributes(realm, id, request)` | attributes | `NotFound`, `StaleVersion` |
//!
//! A transient store failure surfaces as [`AdminError::Unavailable`]. When
//! its `ambiguous` flag is set the write may have committed, so check
//! whether the resource exists before retrying with the same name.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod dto;
pub mod error;
pub mod events;
pub mod service;

pub use dto::{
    ClientRepresentation, CreateClientRequest, CreateRealmRequest, CreateRoleRequest,
    CreatedResponse, CreatedRoleResponse, MapperRepresentation, RealmRepresentation,
    RoleContainer, RoleRepresentation, SyncRequest,
};
pub use error::{AdminError, AdminResult, ErrorResponse};
pub use events::{AdminEventLogger, EventLogError, InMemoryEventLogger, TracingEventLogger};
pub use service::AdminService;
