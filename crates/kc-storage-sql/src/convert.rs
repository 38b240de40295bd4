//! Conversion between database entities and domain models.

use kc_model::{Realm, Resource, ResourceScope, ResourceType};
use kc_storage::StorageError;

use crate::entities::{RealmRow, ResourceRow};

impl From<RealmRow> for Realm {
    fn from(row: RealmRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TryFrom<ResourceRow> for Resource {
    type Error = StorageError;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        let resource_type = ResourceType::parse(&row.resource_type).ok_or_else(|| {
            StorageError::InvalidData(format!(
                "unknown resource type '{}' for {}",
                row.resource_type, row.id
            ))
        })?;
        let scope = match row.owner_id {
            Some(owner) => ResourceScope::client(row.realm_id, owner),
            None => ResourceScope::realm(row.realm_id),
        };

        Ok(Self {
            id: row.id,
            scope,
            resource_type,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            attributes: row.attributes.0,
            version: row.version,
        })
    }
}

/// Converts a batch of rows, failing on the first malformed one.
pub fn rows_to_resources(rows: Vec<ResourceRow>) -> Result<Vec<Resource>, StorageError> {
    rows.into_iter().map(Resource::try_from).collect()
}
