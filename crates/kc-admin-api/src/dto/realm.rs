//! Realm DTOs.

use kc_model::Realm;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create a new realm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRealmRequest {
    /// Realm name (unique identifier).
    pub realm: String,
    /// Display name for UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the realm is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CreateRealmRequest {
    /// Creates a request for an enabled realm.
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            display_name: None,
            enabled: true,
        }
    }

    /// Converts this request to a domain `Realm` model.
    #[must_use]
    pub fn into_realm(self) -> Realm {
        let mut realm = Realm::new(self.realm);
        realm.display_name = self.display_name;
        realm.enabled = self.enabled;
        realm
    }
}

/// Realm representation for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    /// Unique identifier.
    pub id: Uuid,
    /// Realm name.
    pub realm: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the realm is enabled.
    pub enabled: bool,
}

impl From<Realm> for RealmRepresentation {
    fn from(realm: Realm) -> Self {
        Self {
            id: realm.id,
            realm: realm.name,
            display_name: realm.display_name,
            enabled: realm.enabled,
        }
    }
}
