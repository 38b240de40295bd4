//! Data Transfer Objects (DTOs) for the admin surface.
//!
//! These types define the request and response formats. Client and role
//! settings that have no column of their own are kept in the resource's
//! attributes under reserved keys, which are hidden from the custom
//! `attributes` map of the representations.

pub mod client;
pub mod mapper;
pub mod realm;
pub mod role;

pub use client::{ClientRepresentation, CreateClientRequest, CreatedResponse};
pub use mapper::{MapperRepresentation, SyncRequest};
pub use realm::{CreateRealmRequest, RealmRepresentation};
pub use role::{CreateRoleRequest, CreatedRoleResponse, RoleContainer, RoleRepresentation};

use kc_model::Attributes;

use crate::error::{AdminError, AdminResult};

/// Fails if custom attributes use a reserved key.
pub(crate) fn reject_reserved(attributes: &Attributes, reserved: &[&str]) -> AdminResult<()> {
    match attributes.keys().find(|k| reserved.contains(&k.as_str())) {
        Some(key) => Err(AdminError::BadRequest(format!(
            "attribute '{key}' is reserved"
        ))),
        None => Ok(()),
    }
}

/// Splits attributes into `(reserved, custom)`.
pub(crate) fn split_reserved(attributes: &Attributes, reserved: &[&str]) -> (Attributes, Attributes) {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(k, _)| reserved.contains(&k.as_str()))
}

pub(crate) fn first<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(|values| values.first())
        .map(String::as_str)
}

pub(crate) fn single(value: impl Into<String>) -> Vec<String> {
    vec![value.into()]
}
