//! Realm storage provider trait.

use async_trait::async_trait;
use kc_model::Realm;
use uuid::Uuid;

use crate::error::StorageResult;

/// Provider for realm storage operations.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait RealmProvider: Send + Sync {
    /// Creates a new realm.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if a realm with the same name exists.
    async fn create(&self, realm: &Realm) -> StorageResult<()>;

    /// Deletes a realm by ID, together with every resource it contains.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the realm doesn't exist.
    async fn delete(&self, id: Uuid) -> StorageResult<Realm>;

    /// Gets a realm by ID.
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>>;

    /// Gets a realm by name.
    async fn get_by_name(&self, name: &str) -> StorageResult<Option<Realm>>;

    /// Lists all realms ordered by name.
    async fn list(&self) -> StorageResult<Vec<Realm>>;
}
