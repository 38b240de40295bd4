//! The resource registry.
//!
//! ## Creates
//!
//! A create validates its input, confirms the scope exists, takes the
//! per-key advisory lock and hands the record to the store. The store's
//! unique constraint decides who wins; a losing create surfaces as
//! [`RegistryError::Conflict`]. Only after the store confirms the commit is
//! the local cache updated and an invalidation published to peers.
//!
//! ## Reads
//!
//! Reads go through the local cache and fall back to the store on a miss.
//! Writes made by this node are visible to its own reads immediately;
//! writes made elsewhere become visible once the invalidation arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kc_cache::{
    InvalidationBus, InvalidationEvent, InvalidationMessage, LocalInvalidationBus, ResourceCache,
    ResourceCacheConfig,
};
use kc_core::RegistrySettings;
use kc_model::{
    Attributes, Realm, Resource, ResourceLookup, ResourceScope, ResourceType, ScopeOwner,
    UniquenessKey,
};
use kc_storage::{RealmProvider, ResourceProvider, StorageResult};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::locks::{KeyGuard, KeyLocks};
use crate::validation::{validate_name, validate_placement};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(20);

/// Creates, looks up and deletes realms, clients and roles.
pub struct ResourceRegistry<R, P> {
    realms: Arc<R>,
    resources: Arc<P>,
    cache: Arc<ResourceCache>,
    bus: Arc<dyn InvalidationBus>,
    locks: KeyLocks,
    settings: RegistrySettings,
    node_id: String,
}

impl<R, P> std::fmt::Debug for ResourceRegistry<R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("node_id", &self.node_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<R, P> ResourceRegistry<R, P>
where
    R: RealmProvider + 'static,
    P: ResourceProvider + 'static,
{
    /// Creates a registry over the given providers.
    ///
    /// Starts with default settings, an enabled cache, an in-process bus
    /// and a random node ID.
    pub fn new(realms: Arc<R>, resources: Arc<P>) -> Self {
        Self {
            realms,
            resources,
            cache: Arc::new(ResourceCache::default()),
            bus: Arc::new(LocalInvalidationBus::default()),
            locks: KeyLocks::new(),
            settings: RegistrySettings::default(),
            node_id: format!("node-{}", &Uuid::new_v4().simple().to_string()[..8]),
        }
    }

    /// Sets timeouts, retries and the advisory-lock switch.
    #[must_use]
    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the node ID stamped on published invalidations.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Replaces the cache with a fresh one built from `config`.
    #[must_use]
    pub fn with_cache_config(mut self, config: ResourceCacheConfig) -> Self {
        self.cache = Arc::new(ResourceCache::new(config));
        self
    }

    /// Sets the invalidation bus shared with peer nodes.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn InvalidationBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Node ID of this registry.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// The local cache.
    #[must_use]
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    // ---- realms -------------------------------------------------------

    /// Creates a realm.
    ///
    /// ## Errors
    ///
    /// - `InvalidInput` for a malformed name.
    /// - `Conflict` if the name is taken.
    /// - `Transient` if the commit fails or times out.
    #[instrument(skip(self, realm), fields(node = %self.node_id, realm = %realm.name))]
    pub async fn create_realm(&self, realm: Realm) -> RegistryResult<Realm> {
        validate_name("Realm", &realm.name)?;
        self.commit("create_realm", self.realms.create(&realm)).await?;
        info!(realm_id = %realm.id, "realm created");
        Ok(realm)
    }

    /// Finds a realm by name.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if no realm has that name.
    #[instrument(skip(self), fields(node = %self.node_id))]
    pub async fn find_realm(&self, name: &str) -> RegistryResult<Realm> {
        self.read("find_realm", move || self.realms.get_by_name(name))
            .await?
            .ok_or_else(|| RegistryError::not_found("Realm", format!("'{name}'")))
    }

    /// Gets a realm by ID.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the realm does not exist.
    pub async fn get_realm(&self, id: Uuid) -> RegistryResult<Realm> {
        self.read("get_realm", move || self.realms.get_by_id(id))
            .await?
            .ok_or_else(|| RegistryError::not_found("Realm", id))
    }

    /// Lists all realms.
    ///
    /// ## Errors
    ///
    /// Returns `Transient` if the store stays unavailable.
    pub async fn list_realms(&self) -> RegistryResult<Vec<Realm>> {
        self.read("list_realms", move || self.realms.list()).await
    }

    /// Deletes a realm with all of its clients and roles.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the realm does not exist.
    #[instrument(skip(self), fields(node = %self.node_id))]
    pub async fn delete_realm(&self, id: Uuid) -> RegistryResult<Realm> {
        let realm = self.commit("delete_realm", self.realms.delete(id)).await?;
        let event = InvalidationEvent::RealmRemoved { realm_id: id };
        self.cache.apply(&event);
        self.broadcast(event).await;
        info!(realm = %realm.name, "realm deleted");
        Ok(realm)
    }

    // ---- resources ----------------------------------------------------

    /// Creates a client or role.
    ///
    /// Exactly one of any number of concurrent creates for the same scope,
    /// type and name succeeds, across every node sharing the store.
    ///
    /// ## Errors
    ///
    /// - `InvalidInput` for a malformed name or a client scoped to a client.
    /// - `NotFound` if the realm or owning client does not exist.
    /// - `Conflict` if the name is taken.
    /// - `Transient` with `ambiguous` set if the commit fails or times out;
    ///   check whether the resource exists before retrying.
    #[instrument(
        skip(self, attributes),
        fields(node = %self.node_id, scope = %scope, resource_type = %resource_type)
    )]
    pub async fn create_resource(
        &self,
        scope: ResourceScope,
        resource_type: ResourceType,
        name: &str,
        attributes: Attributes,
    ) -> RegistryResult<Resource> {
        validate_name(resource_type.entity_name(), name)?;
        validate_placement(&scope, resource_type)?;
        self.ensure_scope(&scope).await?;

        let resource = Resource::new(scope, resource_type, name, attributes);
        let key = resource.key();

        let _guard = self.lock_key("create_resource", &key).await?;
        self.commit("create_resource", self.resources.create(&resource))
            .await?;

        self.cache.apply_local_write(&resource);
        self.broadcast(InvalidationEvent::Upserted {
            id: resource.id,
            key,
        })
        .await;

        info!(id = %resource.id, name, "resource created");
        Ok(resource)
    }

    /// Gets a client or role by ID or name.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if no such resource exists in the scope.
    #[instrument(skip(self), fields(node = %self.node_id, scope = %scope))]
    pub async fn get_resource(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
        lookup: &ResourceLookup,
    ) -> RegistryResult<Resource> {
        let found = match lookup {
            ResourceLookup::Id(id) => self.lookup_by_id(scope, resource_type, *id).await?,
            ResourceLookup::Name(name) => {
                let key = UniquenessKey::new(*scope, resource_type, name.clone());
                self.lookup_by_key(&key).await?
            }
        };
        found.ok_or_else(|| RegistryError::not_found(resource_type.entity_name(), lookup))
    }

    /// Lists clients or roles of a scope in creation order.
    ///
    /// Includes everything this node committed before the call.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the realm or owning client does not exist.
    #[instrument(skip(self), fields(node = %self.node_id, scope = %scope))]
    pub async fn list_resources(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
    ) -> RegistryResult<Vec<Resource>> {
        if let Some(cached) = self.cache.get_list(scope, resource_type) {
            return Ok(cached);
        }
        self.ensure_scope(scope).await?;

        let epoch = self.cache.epoch();
        let listed = self
            .read("list_resources", move || {
                self.resources.list(scope, resource_type)
            })
            .await?;
        self.cache.fill_list(scope, resource_type, &listed, epoch);
        Ok(listed)
    }

    /// Replaces the attributes of a resource.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if the resource is not in the scope.
    /// - `StaleVersion` if `expected_version` is outdated.
    /// - `Transient` with `ambiguous` set if the commit fails or times out.
    #[instrument(skip(self, attributes), fields(node = %self.node_id, scope = %scope))]
    pub async fn update_attributes(
        &self,
        scope: &ResourceScope,
        id: Uuid,
        expected_version: i64,
        attributes: &Attributes,
    ) -> RegistryResult<Resource> {
        let current = self.load_in_scope(scope, id).await?;
        let updated = self
            .commit(
                "update_attributes",
                self.resources
                    .update_attributes(scope.realm_id, id, expected_version, attributes),
            )
            .await?;

        self.cache.apply_local_write(&updated);
        self.broadcast(InvalidationEvent::Upserted {
            id,
            key: current.key(),
        })
        .await;

        debug!(version = updated.version, "attributes updated");
        Ok(updated)
    }

    /// Deletes a client or role, freeing its name.
    ///
    /// Deleting a client also deletes its roles.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if the resource is not in the scope.
    /// - `Transient` with `ambiguous` set if the commit fails or times out.
    #[instrument(skip(self), fields(node = %self.node_id, scope = %scope))]
    pub async fn delete_resource(&self, scope: &ResourceScope, id: Uuid) -> RegistryResult<Resource> {
        let current = self.load_in_scope(scope, id).await?;
        let key = current.key();

        let _guard = self.lock_key("delete_resource", &key).await?;
        let deleted = self
            .commit("delete_resource", self.resources.delete(scope.realm_id, id))
            .await?;

        self.cache.apply_local_delete(&deleted);
        self.broadcast(InvalidationEvent::Deleted { id, key }).await;

        info!(name = %deleted.name, "resource deleted");
        Ok(deleted)
    }

    // ---- invalidation -------------------------------------------------

    /// Starts applying invalidations published by other nodes.
    ///
    /// Messages published after this call returns are not missed. If the
    /// listener falls behind, the whole cache is dropped.
    pub fn spawn_invalidation_listener(&self) -> JoinHandle<()> {
        let mut stream = self.bus.subscribe();
        let cache = Arc::clone(&self.cache);
        let node_id = self.node_id.clone();
        let span = info_span!("invalidation_listener", node = %node_id);

        tokio::spawn(
            async move {
                loop {
                    match stream.recv().await {
                        Ok(message) if message.origin == node_id => {}
                        Ok(message) => {
                            debug!(origin = %message.origin, event = ?message.event, "invalidation received");
                            cache.apply(&message.event);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "invalidation listener lagged; clearing cache");
                            cache.clear();
                        }
                        Err(RecvError::Closed) => {
                            debug!("invalidation bus closed");
                            break;
                        }
                    }
                }
            }
            .instrument(span),
        )
    }

    // ---- internals ----------------------------------------------------

    async fn ensure_scope(&self, scope: &ResourceScope) -> RegistryResult<()> {
        let realm_id = scope.realm_id;
        let realm = self
            .read("ensure_scope", move || self.realms.get_by_id(realm_id))
            .await?;
        if realm.is_none() {
            return Err(RegistryError::not_found("Realm", realm_id));
        }
        if let ScopeOwner::Client(client_id) = scope.owner {
            let realm_scope = ResourceScope::realm(realm_id);
            if self
                .lookup_by_id(&realm_scope, ResourceType::Client, client_id)
                .await?
                .is_none()
            {
                return Err(RegistryError::not_found("Client", client_id));
            }
        }
        Ok(())
    }

    async fn lookup_by_id(
        &self,
        scope: &ResourceScope,
        resource_type: ResourceType,
        id: Uuid,
    ) -> RegistryResult<Option<Resource>> {
        let belongs = |resource: &Resource| {
            resource.scope == *scope && resource.resource_type == resource_type
        };
        if let Some(cached) = self.cache.get(scope.realm_id, id) {
            return Ok(Some(cached).filter(belongs));
        }

        let epoch = self.cache.epoch();
        let realm_id = scope.realm_id;
        let stored = self
            .read("get_resource", move || self.resources.get_by_id(realm_id, id))
            .await?;
        if let Some(resource) = &stored {
            self.cache.fill(resource, epoch);
        }
        Ok(stored.filter(belongs))
    }

    async fn lookup_by_key(&self, key: &UniquenessKey) -> RegistryResult<Option<Resource>> {
        if let Some(cached) = self.cache.get_by_key(key) {
            return Ok(Some(cached));
        }

        let epoch = self.cache.epoch();
        let stored = self
            .read("get_resource", move || self.resources.get_by_key(key))
            .await?;
        if let Some(resource) = &stored {
            self.cache.fill(resource, epoch);
        }
        Ok(stored)
    }

    // Writes decide on the authoritative copy, never the cache.
    async fn load_in_scope(&self, scope: &ResourceScope, id: Uuid) -> RegistryResult<Resource> {
        let realm_id = scope.realm_id;
        self.read("load_resource", move || {
            self.resources.get_by_id(realm_id, id)
        })
        .await?
        .filter(|resource| resource.scope == *scope)
        .ok_or_else(|| RegistryError::not_found("Resource", id))
    }

    async fn lock_key<'a>(
        &'a self,
        operation: &'static str,
        key: &UniquenessKey,
    ) -> RegistryResult<Option<KeyGuard<'a>>> {
        if !self.settings.advisory_locks {
            return Ok(None);
        }
        tokio::time::timeout(self.settings.commit_timeout, self.locks.lock(key))
            .await
            .map(Some)
            .map_err(|_| RegistryError::Transient {
                operation,
                message: format!("timed out waiting for the lock on {key}"),
                ambiguous: false,
            })
    }

    async fn commit<T>(
        &self,
        operation: &'static str,
        write: impl Future<Output = StorageResult<T>>,
    ) -> RegistryResult<T> {
        match tokio::time::timeout(self.settings.commit_timeout, write).await {
            Ok(result) => result.map_err(|err| RegistryError::from_write(operation, err)),
            Err(_) => {
                warn!(
                    operation,
                    timeout = ?self.settings.commit_timeout,
                    "commit timed out; outcome unknown"
                );
                Err(RegistryError::Transient {
                    operation,
                    message: format!(
                        "no commit confirmation within {:?}",
                        self.settings.commit_timeout
                    ),
                    ambiguous: true,
                })
            }
        }
    }

    async fn read<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> RegistryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut retries = 0;
        loop {
            let error = match tokio::time::timeout(self.settings.read_timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => RegistryError::from_read(operation, err),
                Err(_) => RegistryError::Transient {
                    operation,
                    message: format!("no response within {:?}", self.settings.read_timeout),
                    ambiguous: false,
                },
            };
            if !error.is_retryable() || retries >= self.settings.read_retries {
                return Err(error);
            }
            retries += 1;
            debug!(operation, retries, error = %error, "retrying read");
            tokio::time::sleep(RETRY_BASE_DELAY * retries).await;
        }
    }

    async fn broadcast(&self, event: InvalidationEvent) {
        let message = InvalidationMessage::new(self.node_id.clone(), event);
        if let Err(e) = self.bus.publish(&message).await {
            warn!(error = %e, event = ?message.event, "failed to publish invalidation");
        }
    }
}
