//! Role DTOs.

use kc_model::{Attributes, Resource, ResourceScope, ScopeOwner};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{first, reject_reserved, single, split_reserved};
use crate::error::AdminResult;

/// Reserved attribute holding the role description.
pub const DESCRIPTION_ATTRIBUTE: &str = "description";

const RESERVED: &[&str] = &[DESCRIPTION_ATTRIBUTE];

/// Where a role lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum RoleContainer {
    /// Realm role.
    Realm,
    /// Role owned by the client with this ID.
    Client(Uuid),
}

impl RoleContainer {
    /// Scope of the container inside a realm.
    #[must_use]
    pub const fn scope(self, realm_id: Uuid) -> ResourceScope {
        match self {
            Self::Realm => ResourceScope::realm(realm_id),
            Self::Client(client_id) => ResourceScope::client(realm_id, client_id),
        }
    }
}

/// Request to create a new role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    /// Role name (required, unique within scope).
    pub name: String,
    /// Role description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Custom role attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl CreateRoleRequest {
    /// Creates a request without description or attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            attributes: Attributes::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Splits this request into the role name and stored attributes.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` if a custom attribute uses a
    /// reserved key.
    pub fn into_parts(self) -> AdminResult<(String, Attributes)> {
        reject_reserved(&self.attributes, RESERVED)?;
        let mut attributes = self.attributes;
        if let Some(description) = self.description {
            attributes.insert(DESCRIPTION_ATTRIBUTE.to_string(), single(description));
        }
        Ok((self.name, attributes))
    }
}

/// Response for a created role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoleResponse {
    /// Name of the created role.
    pub name: String,
}

/// Full role representation for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRepresentation {
    /// Unique identifier.
    pub id: Uuid,
    /// Role name.
    pub name: String,
    /// Role description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether this is a client role.
    pub client_role: bool,
    /// Container ID (realm ID for realm roles, client ID for client roles).
    pub container_id: Uuid,
    /// Custom role attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl From<Resource> for RoleRepresentation {
    fn from(role: Resource) -> Self {
        let (reserved, custom) = split_reserved(&role.attributes, RESERVED);
        let (client_role, container_id) = match role.scope.owner {
            ScopeOwner::Realm => (false, role.scope.realm_id),
            ScopeOwner::Client(client_id) => (true, client_id),
        };
        Self {
            id: role.id,
            description: first(&reserved, DESCRIPTION_ATTRIBUTE).map(ToString::to_string),
            name: role.name,
            client_role,
            container_id,
            attributes: custom,
        }
    }
}
