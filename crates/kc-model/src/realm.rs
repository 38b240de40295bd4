//! Realm domain model.
//!
//! A realm is the top-level container for clients and roles.
//! Each realm owns independent uniqueness domains per resource type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Keycloak realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    /// Unique identifier.
    pub id: Uuid,
    /// Realm name (unique across the deployment).
    pub name: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Whether the realm is enabled.
    pub enabled: bool,
    /// When the realm was created.
    pub created_at: DateTime<Utc>,
    /// When the realm was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Realm {
    /// Creates a new enabled realm with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            display_name: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}
