//! Client DTOs.

use kc_model::{Attributes, Resource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{first, reject_reserved, single, split_reserved};
use crate::error::AdminResult;

/// Reserved attribute holding the display name.
pub const NAME_ATTRIBUTE: &str = "name";
/// Reserved attribute holding the description.
pub const DESCRIPTION_ATTRIBUTE: &str = "description";
/// Reserved attribute holding the enabled flag.
pub const ENABLED_ATTRIBUTE: &str = "enabled";
/// Reserved attribute holding the public client flag.
pub const PUBLIC_CLIENT_ATTRIBUTE: &str = "publicClient";
/// Reserved attribute holding the redirect URIs.
pub const REDIRECT_URIS_ATTRIBUTE: &str = "redirectUris";

pub(crate) const RESERVED: &[&str] = &[
    NAME_ATTRIBUTE,
    DESCRIPTION_ATTRIBUTE,
    ENABLED_ATTRIBUTE,
    PUBLIC_CLIENT_ATTRIBUTE,
    REDIRECT_URIS_ATTRIBUTE,
];

/// Request to create a new client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    /// Client identifier, unique within the realm.
    pub client_id: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the client is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether this is a public client.
    #[serde(default)]
    pub public_client: bool,
    /// Allowed redirect URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    /// Custom attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

fn default_true() -> bool {
    true
}

impl CreateClientRequest {
    /// Creates a request for an enabled confidential client.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: None,
            description: None,
            enabled: true,
            public_client: false,
            redirect_uris: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    /// Converts this request into the attributes stored on the resource.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` if a custom attribute uses a
    /// reserved key.
    pub fn into_attributes(self) -> AdminResult<Attributes> {
        reject_reserved(&self.attributes, RESERVED)?;

        let mut attributes = self.attributes;
        if let Some(name) = self.name {
            attributes.insert(NAME_ATTRIBUTE.to_string(), single(name));
        }
        if let Some(description) = self.description {
            attributes.insert(DESCRIPTION_ATTRIBUTE.to_string(), single(description));
        }
        attributes.insert(ENABLED_ATTRIBUTE.to_string(), single(self.enabled.to_string()));
        attributes.insert(
            PUBLIC_CLIENT_ATTRIBUTE.to_string(),
            single(self.public_client.to_string()),
        );
        if !self.redirect_uris.is_empty() {
            attributes.insert(REDIRECT_URIS_ATTRIBUTE.to_string(), self.redirect_uris);
        }
        Ok(attributes)
    }
}

/// Response for a created client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResponse {
    /// Server-generated identifier.
    pub id: Uuid,
}

/// Full client representation for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    /// Unique identifier.
    pub id: Uuid,
    /// Client identifier.
    pub client_id: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the client is enabled.
    pub enabled: bool,
    /// Whether this is a public client.
    pub public_client: bool,
    /// Allowed redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Custom attributes.
    #[serde(default)]
    pub attributes: Attributes,
    /// Creation time, epoch milliseconds.
    pub created_timestamp: i64,
    /// Optimistic concurrency token.
    pub version: i64,
}

impl From<Resource> for ClientRepresentation {
    fn from(resource: Resource) -> Self {
        let (reserved, custom) = split_reserved(&resource.attributes, RESERVED);
        let flag = |key: &str, default: bool| {
            first(&reserved, key).map_or(default, |v| v == "true")
        };

        Self {
            id: resource.id,
            name: first(&reserved, NAME_ATTRIBUTE).map(ToString::to_string),
            description: first(&reserved, DESCRIPTION_ATTRIBUTE).map(ToString::to_string),
            enabled: flag(ENABLED_ATTRIBUTE, true),
            public_client: flag(PUBLIC_CLIENT_ATTRIBUTE, false),
            redirect_uris: reserved
                .get(REDIRECT_URIS_ATTRIBUTE)
                .cloned()
                .unwrap_or_default(),
            attributes: custom,
            created_timestamp: resource.created_at.timestamp_millis(),
            version: resource.version,
            client_id: resource.name,
        }
    }
}
