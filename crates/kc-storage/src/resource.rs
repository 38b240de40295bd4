//! Resource storage provider trait.
//!
//! The provider owns the uniqueness guarantee: `create` must fail with
//! `StorageError::Duplicate` when the resource's [`UniquenessKey`] is
//! already taken, atomically with respect to every other writer of the
//! same store, including writers in other processes.

use async_trait::async_trait;
use kc_model::{Attributes, Resource, ResourceScope, ResourceType, UniquenessKey};
use uuid::Uuid;

use crate::error::StorageResult;

/// Provider for client and role storage operations.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Creates a resource and claims its uniqueness key in one transaction.
    ///
    /// Nothing is persisted if the call fails, including when the returned
    /// future is dropped before completion.
    ///
    /// ## Errors
    ///
    /// - `StorageError::Duplicate` if the key is taken.
    /// - `StorageError::InvalidReference` if the realm or owning client is gone.
    async fn create(&self, resource: &Resource) -> StorageResult<()>;

    /// Gets a committed resource by ID.
    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Resource>>;

    /// Gets a committed resource by its uniqueness key.
    async fn get_by_key(&self, key: &UniquenessKey) -> StorageResult<Option<Resource>>;

    /// Lists resources of one type in a scope, in creation order.
    async fn list(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
    ) -> StorageResult<Vec<Resource>>;

    /// Replaces the attributes of a resource if its version still matches.
    ///
    /// Returns the updated resource with its version incremented.
    ///
    /// ## Errors
    ///
    /// - `StorageError::NotFound` if the resource doesn't exist.
    /// - `StorageError::VersionConflict` if `expected_version` is outdated.
    async fn update_attributes(
        &self,
        realm_id: Uuid,
        id: Uuid,
        expected_version: i64,
        attributes: &Attributes,
    ) -> StorageResult<Resource>;

    /// Deletes a resource and frees its uniqueness key in one transaction.
    ///
    /// Deleting a client also deletes the roles it owns. Returns the
    /// deleted resource.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the resource doesn't exist.
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Resource>;
}
