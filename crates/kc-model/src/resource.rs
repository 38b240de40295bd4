//! Registry resource model.
//!
//! Clients and roles share one representation: a named, uniquely
//! identified object inside a scope. A client is always owned by its
//! realm; a role is owned either by the realm or by a client.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Multi-valued free-form attributes attached to a resource.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// Kind of registry resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Client (application) registration.
    Client,
    /// Role definition.
    Role,
}

impl ResourceType {
    /// Returns the stable string form used in storage and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Role => "role",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Self::Client),
            "role" => Some(Self::Role),
            _ => None,
        }
    }

    /// Entity name used in error messages.
    #[must_use]
    pub const fn entity_name(self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Role => "Role",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a resource namespace inside a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ScopeOwner {
    /// The realm itself (clients and realm roles).
    Realm,
    /// A client (client roles).
    Client(Uuid),
}

/// The namespace a uniqueness constraint applies within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceScope {
    /// Realm the scope belongs to.
    pub realm_id: Uuid,
    /// Owner of the namespace.
    pub owner: ScopeOwner,
}

impl ResourceScope {
    /// Realm-level scope.
    #[must_use]
    pub const fn realm(realm_id: Uuid) -> Self {
        Self {
            realm_id,
            owner: ScopeOwner::Realm,
        }
    }

    /// Client-level scope (for client roles).
    #[must_use]
    pub const fn client(realm_id: Uuid, client_id: Uuid) -> Self {
        Self {
            realm_id,
            owner: ScopeOwner::Client(client_id),
        }
    }

    /// Returns the owning client, if this is a client scope.
    #[must_use]
    pub const fn owner_id(&self) -> Option<Uuid> {
        match self.owner {
            ScopeOwner::Realm => None,
            ScopeOwner::Client(id) => Some(id),
        }
    }

    /// Checks if this scope is owned by a client.
    #[must_use]
    pub const fn is_client_scope(&self) -> bool {
        matches!(self.owner, ScopeOwner::Client(_))
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            ScopeOwner::Realm => write!(f, "realm:{}", self.realm_id),
            ScopeOwner::Client(id) => write!(f, "realm:{}/client:{id}", self.realm_id),
        }
    }
}

/// Composite key that maps to at most one live resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniquenessKey {
    /// Namespace.
    pub scope: ResourceScope,
    /// Resource kind.
    pub resource_type: ResourceType,
    /// Resource name.
    pub name: String,
}

impl UniquenessKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(scope: ResourceScope, resource_type: ResourceType, name: impl Into<String>) -> Self {
        Self {
            scope,
            resource_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for UniquenessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.scope, self.resource_type, self.name)
    }
}

/// Lookup by identifier or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLookup {
    /// By server-generated id.
    Id(Uuid),
    /// By name within the scope.
    Name(String),
}

impl From<Uuid> for ResourceLookup {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ResourceLookup {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ResourceLookup {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for ResourceLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// A client or role.
///
/// `id` and `name` never change after creation. `version` starts at 1 and
/// increases by one on every attribute update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Server-generated identifier, never reused.
    pub id: Uuid,
    /// Namespace the name is unique within.
    pub scope: ResourceScope,
    /// Resource kind.
    pub resource_type: ResourceType,
    /// Name, unique within scope and type.
    pub name: String,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
    /// When the attributes were last updated.
    pub updated_at: DateTime<Utc>,
    /// Free-form attributes.
    pub attributes: Attributes,
    /// Optimistic concurrency token.
    pub version: i64,
}

impl Resource {
    /// Initial version assigned at creation.
    pub const INITIAL_VERSION: i64 = 1;

    /// Creates a resource with a fresh identifier.
    #[must_use]
    pub fn new(
        scope: ResourceScope,
        resource_type: ResourceType,
        name: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            scope,
            resource_type,
            name: name.into(),
            created_at: now,
            updated_at: now,
            attributes,
            version: Self::INITIAL_VERSION,
        }
    }

    /// Returns the uniqueness key of this resource.
    #[must_use]
    pub fn key(&self) -> UniquenessKey {
        UniquenessKey::new(self.scope, self.resource_type, self.name.clone())
    }

    /// Realm this resource belongs to.
    #[must_use]
    pub const fn realm_id(&self) -> Uuid {
        self.scope.realm_id
    }

    /// Checks if this is a client.
    #[must_use]
    pub const fn is_client(&self) -> bool {
        matches!(self.resource_type, ResourceType::Client)
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn first_attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Checks whether this resource matches a lookup.
    #[must_use]
    pub fn matches(&self, lookup: &ResourceLookup) -> bool {
        match lookup {
            ResourceLookup::Id(id) => self.id == *id,
            ResourceLookup::Name(name) => self.name == *name,
        }
    }
}
