//! `PostgreSQL` implementation of the realm storage provider.

use async_trait::async_trait;
use kc_model::Realm;
use kc_storage::error::StorageResult;
use kc_storage::{RealmProvider, StorageError};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{RealmRow, REALM_COLUMNS};
use crate::error::{from_insert_error, from_sqlx_error};

/// `PostgreSQL` realm storage provider.
#[derive(Debug, Clone)]
pub struct PgRealmProvider {
    pool: PgPool,
}

impl PgRealmProvider {
    /// Creates a new `PostgreSQL` realm provider.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RealmProvider for PgRealmProvider {
    #[instrument(skip(self, realm), fields(realm = %realm.name))]
    async fn create(&self, realm: &Realm) -> StorageResult<()> {
        sqlx::query(
            r"INSERT INTO realms (id, name, display_name, enabled, created_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(realm.id)
        .bind(&realm.name)
        .bind(&realm.display_name)
        .bind(realm.enabled)
        .bind(realm.created_at)
        .bind(realm.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| from_insert_error(e, "Realm", "name", &realm.name))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> StorageResult<Realm> {
        let sql = format!("DELETE FROM realms WHERE id = $1 RETURNING {REALM_COLUMNS}");
        let row: Option<RealmRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        row.map(Realm::from)
            .ok_or_else(|| StorageError::not_found("Realm", id))
    }

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>> {
        let sql = format!("SELECT {REALM_COLUMNS} FROM realms WHERE id = $1");
        let row: Option<RealmRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        Ok(row.map(Realm::from))
    }

    async fn get_by_name(&self, name: &str) -> StorageResult<Option<Realm>> {
        let sql = format!("SELECT {REALM_COLUMNS} FROM realms WHERE name = $1");
        let row: Option<RealmRow> = sqlx::query_as(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        Ok(row.map(Realm::from))
    }

    async fn list(&self) -> StorageResult<Vec<Realm>> {
        let sql = format!("SELECT {REALM_COLUMNS} FROM realms ORDER BY name");
        let rows: Vec<RealmRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        Ok(rows.into_iter().map(Realm::from).collect())
    }
}
