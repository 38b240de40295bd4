//! Database entity types for `SQLx`.
//!
//! These types map directly to database rows and are converted
//! to domain models in [`crate::convert`].

use chrono::{DateTime, Utc};
use kc_model::Attributes;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for realms.
#[derive(Debug, Clone, FromRow)]
pub struct RealmRow {
    /// Realm ID.
    pub id: Uuid,
    /// Realm name.
    pub name: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Enabled flag.
    pub enabled: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Database row for clients and roles.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    /// Commit sequence, defines list order.
    pub seq: i64,
    /// Resource ID.
    pub id: Uuid,
    /// Owning realm.
    pub realm_id: Uuid,
    /// `client` or `role`.
    pub resource_type: String,
    /// Owning client for client roles.
    pub owner_id: Option<Uuid>,
    /// Resource name.
    pub name: String,
    /// Attributes as JSONB.
    pub attributes: Json<Attributes>,
    /// Optimistic concurrency token.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Column list matching [`ResourceRow`].
pub const RESOURCE_COLUMNS: &str =
    "seq, id, realm_id, resource_type, owner_id, name, attributes, version, created_at, updated_at";

/// Column list matching [`RealmRow`].
pub const REALM_COLUMNS: &str = "id, name, display_name, enabled, created_at, updated_at";
