//! # kc-storage-sql
//!
//! SQLx-based storage implementation for the Keycloak resource registry.
//!
//! This crate provides `PostgreSQL` storage using `SQLx`. The schema lives
//! in the workspace `migrations/` directory and is embedded in [`MIGRATOR`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod convert;
pub mod entities;
pub mod error;
pub mod pool;
pub mod realm;
pub mod resource;

pub use pool::{create_pool, PoolConfig};
pub use realm::PgRealmProvider;
pub use resource::PgResourceProvider;

use kc_storage::StorageError;
use sqlx::migrate::Migrator;
use sqlx::PgPool;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies pending schema migrations.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| StorageError::Internal(format!("migration failed: {e}")))
}

/// `PostgreSQL` store sharing one pool between the providers.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the given pool configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn connect(config: &PoolConfig) -> Result<Self, StorageError> {
        Ok(Self::new(create_pool(config).await?))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Realm provider backed by this store.
    #[must_use]
    pub fn realms(&self) -> PgRealmProvider {
        PgRealmProvider::new(self.pool.clone())
    }

    /// Resource provider backed by this store.
    #[must_use]
    pub fn resources(&self) -> PgResourceProvider {
        PgResourceProvider::new(self.pool.clone())
    }
}
