//! Store selection for a node.
//!
//! A node runs against either the in-memory store or `PostgreSQL`,
//! chosen at startup. The enums here let the registry stay generic over a
//! single provider type per role whichever backend is picked.

use async_trait::async_trait;
use kc_model::{Attributes, Realm, Resource, ResourceScope, ResourceType, UniquenessKey};
use kc_storage::{
    MemoryRealmProvider, MemoryResourceProvider, MemoryStore, RealmProvider, ResourceProvider,
    StorageResult,
};
use kc_storage_sql::{PgRealmProvider, PgResourceProvider, PgStore};
use uuid::Uuid;

/// Realm provider of the selected backend.
#[derive(Debug, Clone)]
pub enum NodeRealmProvider {
    /// In-memory store.
    Memory(MemoryRealmProvider),
    /// `PostgreSQL` store.
    Postgres(PgRealmProvider),
}

/// Resource provider of the selected backend.
#[derive(Debug, Clone)]
pub enum NodeResourceProvider {
    /// In-memory store.
    Memory(MemoryResourceProvider),
    /// `PostgreSQL` store.
    Postgres(PgResourceProvider),
}

/// Both providers of one backend.
#[derive(Debug, Clone)]
pub struct StorageProviders {
    /// Realm provider.
    pub realms: NodeRealmProvider,
    /// Resource provider.
    pub resources: NodeResourceProvider,
}

impl StorageProviders {
    /// Providers over an in-memory store.
    #[must_use]
    pub fn memory(store: &MemoryStore) -> Self {
        Self {
            realms: NodeRealmProvider::Memory(store.realms()),
            resources: NodeResourceProvider::Memory(store.resources()),
        }
    }

    /// Providers over a `PostgreSQL` store.
    #[must_use]
    pub fn postgres(store: &PgStore) -> Self {
        Self {
            realms: NodeRealmProvider::Postgres(store.realms()),
            resources: NodeResourceProvider::Postgres(store.resources()),
        }
    }

    /// Name of the backend, for logs.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self.realms {
            NodeRealmProvider::Memory(_) => "memory",
            NodeRealmProvider::Postgres(_) => "postgres",
        }
    }
}

#[async_trait]
impl RealmProvider for NodeRealmProvider {
    async fn create(&self, realm: &Realm) -> StorageResult<()> {
        match self {
            Self::Memory(p) => p.create(realm).await,
            Self::Postgres(p) => p.create(realm).await,
        }
    }

    async fn delete(&self, id: Uuid) -> StorageResult<Realm> {
        match self {
            Self::Memory(p) => p.delete(id).await,
            Self::Postgres(p) => p.delete(id).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>> {
        match self {
            Self::Memory(p) => p.get_by_id(id).await,
            Self::Postgres(p) => p.get_by_id(id).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> StorageResult<Option<Realm>> {
        match self {
            Self::Memory(p) => p.get_by_name(name).await,
            Self::Postgres(p) => p.get_by_name(name).await,
        }
    }

    async fn list(&self) -> StorageResult<Vec<Realm>> {
        match self {
            Self::Memory(p) => p.list().await,
            Self::Postgres(p) => p.list().await,
        }
    }
}

#[async_trait]
impl ResourceProvider for NodeResourceProvider {
    async fn create(&self, resource: &Resource) -> StorageResult<()> {
        match self {
            Self::Memory(p) => p.create(resource).await,
            Self::Postgres(p) => p.create(resource).await,
        }
    }

    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Resource>> {
        match self {
            Self::Memory(p) => p.get_by_id(realm_id, id).await,
            Self::Postgres(p) => p.get_by_id(realm_id, id).await,
        }
    }

    async fn get_by_key(&self, key: &UniquenessKey) -> StorageResult<Option<Resource>> {
        match self {
            Self::Memory(p) => p.get_by_key(key).await,
            Self::Postgres(p) => p.get_by_key(key).await,
        }
    }

    async fn list(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
    ) -> StorageResult<Vec<Resource>> {
        match self {
            Self::Memory(p) => p.list(scope, resource_type).await,
            Self::Postgres(p) => p.list(scope, resource_type).await,
        }
    }

    async fn update_attributes(
        &self,
        realm_id: Uuid,
        id: Uuid,
        expected_version: i64,
        attributes: &Attributes,
    ) -> StorageResult<Resource> {
        match self {
            Self::Memory(p) => p.update_attributes(realm_id, id, expected_version, attributes).await,
            Self::Postgres(p) => p.update_attributes(realm_id, id, expected_version, attributes).await,
        }
    }

    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Resource> {
        match self {
            Self::Memory(p) => p.delete(realm_id, id).await,
            Self::Postgres(p) => p.delete(realm_id, id).await,
        }
    }
}
