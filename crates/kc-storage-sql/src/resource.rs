//! `PostgreSQL` implementation of the resource storage provider.
//!
//! The `resources_scope_name_key` unique index is what enforces name
//! uniqueness across every process sharing the database. Inserts run in
//! a transaction that also locks the owning client row, so a concurrent
//! client delete cannot orphan a new client role.

use async_trait::async_trait;
use chrono::Utc;
use kc_model::{Attributes, Resource, ResourceScope, ResourceType, UniquenessKey};
use kc_storage::error::StorageResult;
use kc_storage::{ResourceProvider, StorageError};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::convert::rows_to_resources;
use crate::entities::{ResourceRow, RESOURCE_COLUMNS};
use crate::error::{from_insert_error, from_sqlx_error};

/// `PostgreSQL` resource storage provider.
#[derive(Debug, Clone)]
pub struct PgResourceProvider {
    pool: PgPool,
}

impl PgResourceProvider {
    /// Creates a new `PostgreSQL` resource provider.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceProvider for PgResourceProvider {
    #[instrument(skip(self, resource), fields(key = %resource.key(), id = %resource.id))]
    async fn create(&self, resource: &Resource) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(from_sqlx_error)?;

        if let Some(owner_id) = resource.scope.owner_id() {
            let owner: Option<(Uuid,)> = sqlx::query_as(
                r"SELECT id FROM resources
                  WHERE id = $1 AND realm_id = $2 AND resource_type = 'client'
                  FOR SHARE",
            )
            .bind(owner_id)
            .bind(resource.realm_id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(from_sqlx_error)?;

            if owner.is_none() {
                return Err(StorageError::InvalidReference(format!(
                    "client {owner_id} does not exist"
                )));
            }
        }

        sqlx::query(
            r"INSERT INTO resources
                (id, realm_id, resource_type, owner_id, name, attributes, version, created_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(resource.id)
        .bind(resource.realm_id())
        .bind(resource.resource_type.as_str())
        .bind(resource.scope.owner_id())
        .bind(&resource.name)
        .bind(Json(&resource.attributes))
        .bind(resource.version)
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            from_insert_error(e, resource.resource_type.entity_name(), "name", &resource.name)
        })?;

        tx.commit().await.map_err(from_sqlx_error)?;
        debug!("resource committed");
        Ok(())
    }

    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Resource>> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE realm_id = $1 AND id = $2");
        let row: Option<ResourceRow> = sqlx::query_as(&sql)
            .bind(realm_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        row.map(Resource::try_from).transpose()
    }

    async fn get_by_key(&self, key: &UniquenessKey) -> StorageResult<Option<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE realm_id = $1 AND resource_type = $2
               AND owner_id IS NOT DISTINCT FROM $3 AND name = $4"
        );
        let row: Option<ResourceRow> = sqlx::query_as(&sql)
            .bind(key.scope.realm_id)
            .bind(key.resource_type.as_str())
            .bind(key.scope.owner_id())
            .bind(&key.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        row.map(Resource::try_from).transpose()
    }

    async fn list(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
    ) -> StorageResult<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE realm_id = $1 AND resource_type = $2 AND owner_id IS NOT DISTINCT FROM $3
             ORDER BY seq"
        );
        let rows: Vec<ResourceRow> = sqlx::query_as(&sql)
            .bind(scope.realm_id)
            .bind(resource_type.as_str())
            .bind(scope.owner_id())
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        rows_to_resources(rows)
    }

    #[instrument(skip(self, attributes))]
    async fn update_attributes(
        &self,
        realm_id: Uuid,
        id: Uuid,
        expected_version: i64,
        attributes: &Attributes,
    ) -> StorageResult<Resource> {
        let mut tx = self.pool.begin().await.map_err(from_sqlx_error)?;

        let sql = format!(
            "UPDATE resources SET attributes = $1, version = version + 1, updated_at = $2
             WHERE realm_id = $3 AND id = $4 AND version = $5
             RETURNING {RESOURCE_COLUMNS}"
        );
        let updated: Option<ResourceRow> = sqlx::query_as(&sql)
            .bind(Json(attributes))
            .bind(Utc::now())
            .bind(realm_id)
            .bind(id)
            .bind(expected_version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(from_sqlx_error)?;

        let Some(row) = updated else {
            let current: Option<(i64, String)> = sqlx::query_as(
                "SELECT version, resource_type FROM resources WHERE realm_id = $1 AND id = $2",
            )
            .bind(realm_id)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(from_sqlx_error)?;

            return Err(match current {
                Some((actual, resource_type)) => StorageError::VersionConflict {
                    entity_type: ResourceType::parse(&resource_type)
                        .map_or("Resource", ResourceType::entity_name),
                    id,
                    expected: expected_version,
                    actual,
                },
                None => StorageError::not_found("Resource", id),
            });
        };

        tx.commit().await.map_err(from_sqlx_error)?;
        Resource::try_from(row)
    }

    #[instrument(skip(self))]
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Resource> {
        // Owned client roles go with the client through ON DELETE CASCADE.
        let sql = format!(
            "DELETE FROM resources WHERE realm_id = $1 AND id = $2 RETURNING {RESOURCE_COLUMNS}"
        );
        let row: Option<ResourceRow> = sqlx::query_as(&sql)
            .bind(realm_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        row.map(Resource::try_from)
            .transpose()?
            .ok_or_else(|| StorageError::not_found("Resource", id))
    }
}
