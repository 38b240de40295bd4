//! Administrative operations over the registry.
//!
//! Realms are addressed by name, clients by ID and roles by name inside
//! their container, mirroring the admin REST paths.

use std::sync::Arc;

use kc_core::event::{Event, EventBuilder, EventType};
use kc_federation::{FederationError, MapperRegistry, SyncDirection};
use kc_model::{Attributes, Realm, Resource, ResourceLookup, ResourceScope, ResourceType};
use kc_registry::ResourceRegistry;
use kc_storage::{RealmProvider, ResourceProvider};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::dto::client::RESERVED as CLIENT_RESERVED;
use crate::dto::{
    split_reserved, ClientRepresentation, CreateClientRequest, CreateRealmRequest,
    CreateRoleRequest, CreatedResponse, CreatedRoleResponse, MapperRepresentation,
    RealmRepresentation, RoleContainer, RoleRepresentation, SyncRequest,
};
use crate::error::{AdminError, AdminResult};
use crate::events::{AdminEventLogger, TracingEventLogger};

/// Admin entry point used by a transport layer.
pub struct AdminService<R, P, L = TracingEventLogger> {
    registry: Arc<ResourceRegistry<R, P>>,
    mappers: Arc<MapperRegistry>,
    events: L,
}

impl<R, P, L> std::fmt::Debug for AdminService<R, P, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminService").finish_non_exhaustive()
    }
}

impl<R, P> AdminService<R, P>
where
    R: RealmProvider + 'static,
    P: ResourceProvider + 'static,
{
    /// Creates a service that logs events through tracing.
    #[must_use]
    pub fn new(registry: Arc<ResourceRegistry<R, P>>, mappers: Arc<MapperRegistry>) -> Self {
        Self::with_event_logger(registry, mappers, TracingEventLogger::new())
    }
}

impl<R, P, L> AdminService<R, P, L>
where
    R: RealmProvider + 'static,
    P: ResourceProvider + 'static,
    L: AdminEventLogger,
{
    /// Creates a service with a custom event logger.
    #[must_use]
    pub fn with_event_logger(
        registry: Arc<ResourceRegistry<R, P>>,
        mappers: Arc<MapperRegistry>,
        events: L,
    ) -> Self {
        Self {
            registry,
            mappers,
            events,
        }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ResourceRegistry<R, P>> {
        &self.registry
    }

    /// The mapper registry.
    #[must_use]
    pub fn mappers(&self) -> &Arc<MapperRegistry> {
        &self.mappers
    }

    // ---- realms -------------------------------------------------------

    /// Creates a realm.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the name is taken.
    #[instrument(skip(self, request), fields(realm = %request.realm))]
    pub async fn create_realm(&self, request: CreateRealmRequest) -> AdminResult<RealmRepresentation> {
        let realm = self.registry.create_realm(request.into_realm()).await?;
        self.emit(
            Event::builder(EventType::RealmCreated)
                .realm(realm.id)
                .resource(realm.id, realm.name.clone()),
        )
        .await;
        Ok(realm.into())
    }

    /// Gets a realm by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no realm has the name.
    pub async fn get_realm(&self, realm: &str) -> AdminResult<RealmRepresentation> {
        Ok(self.realm(realm).await?.into())
    }

    /// Lists all realms.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store cannot be reached.
    pub async fn list_realms(&self) -> AdminResult<Vec<RealmRepresentation>> {
        let realms = self.registry.list_realms().await?;
        Ok(realms.into_iter().map(Into::into).collect())
    }

    /// Deletes a realm and everything in it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no realm has the name.
    #[instrument(skip(self))]
    pub async fn delete_realm(&self, realm: &str) -> AdminResult<()> {
        let realm = self.realm(realm).await?;
        self.registry.delete_realm(realm.id).await?;
        self.emit(
            Event::builder(EventType::RealmDeleted)
                .realm(realm.id)
                .resource(realm.id, realm.name),
        )
        .await;
        Ok(())
    }

    // ---- clients ------------------------------------------------------

    /// Creates a client.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the client ID is taken in the realm
    /// - `BadRequest` for a malformed client ID or reserved attribute
    /// - `Unavailable` if the store failed; the client may exist
    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn create_client(
        &self,
        realm: &str,
        request: CreateClientRequest,
    ) -> AdminResult<CreatedResponse> {
        let realm = self.realm(realm).await?;
        let client_id = request.client_id.clone();
        let attributes = request.into_attributes()?;

        let client = self
            .registry
            .create_resource(
                ResourceScope::realm(realm.id),
                ResourceType::Client,
                &client_id,
                attributes,
            )
            .await?;

        self.emit(resource_event(EventType::ClientCreated, &client)).await;
        Ok(CreatedResponse { id: client.id })
    }

    /// Gets a client by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the client is not in the realm.
    pub async fn get_client(&self, realm: &str, id: Uuid) -> AdminResult<ClientRepresentation> {
        let realm = self.realm(realm).await?;
        Ok(self.client(realm.id, id).await?.into())
    }

    /// Finds a client by its client ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the client is not in the realm.
    pub async fn find_client(
        &self,
        realm: &str,
        client_id: &str,
    ) -> AdminResult<ClientRepresentation> {
        let realm = self.realm(realm).await?;
        let client = self
            .registry
            .get_resource(
                &ResourceScope::realm(realm.id),
                ResourceType::Client,
                &ResourceLookup::Name(client_id.to_string()),
            )
            .await?;
        Ok(client.into())
    }

    /// Lists the clients of a realm in creation order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the realm does not exist.
    pub async fn list_clients(&self, realm: &str) -> AdminResult<Vec<ClientRepresentation>> {
        let realm = self.realm(realm).await?;
        let clients = self
            .registry
            .list_resources(&ResourceScope::realm(realm.id), ResourceType::Client)
            .await?;
        Ok(clients.into_iter().map(Into::into).collect())
    }

    /// Deletes a client and its roles.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the client is not in the realm.
    #[instrument(skip(self))]
    pub async fn delete_client(&self, realm: &str, id: Uuid) -> AdminResult<()> {
        let realm = self.realm(realm).await?;
        let deleted = self
            .registry
            .delete_resource(&ResourceScope::realm(realm.id), id)
            .await?;
        self.emit(resource_event(EventType::ClientDeleted, &deleted)).await;
        Ok(())
    }

    // ---- roles --------------------------------------------------------

    /// Creates a realm or client role.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the name is taken in the container
    /// - `NotFound` if the owning client does not exist
    /// - `BadRequest` for a malformed name or reserved attribute
    #[instrument(skip(self, request), fields(role = %request.name))]
    pub async fn create_role(
        &self,
        realm: &str,
        container: RoleContainer,
        request: CreateRoleRequest,
    ) -> AdminResult<CreatedRoleResponse> {
        let realm = self.realm(realm).await?;
        let (name, attributes) = request.into_parts()?;

        let role = self
            .registry
            .create_resource(container.scope(realm.id), ResourceType::Role, &name, attributes)
            .await?;

        self.emit(resource_event(EventType::RoleCreated, &role)).await;
        Ok(CreatedRoleResponse { name: role.name })
    }

    /// Gets a role by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container has no role with the name.
    pub async fn get_role(
        &self,
        realm: &str,
        container: RoleContainer,
        name: &str,
    ) -> AdminResult<RoleRepresentation> {
        let realm = self.realm(realm).await?;
        Ok(self.role(container.scope(realm.id), name).await?.into())
    }

    /// Lists the roles of a container in creation order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the realm or owning client does not exist.
    pub async fn list_roles(
        &self,
        realm: &str,
        container: RoleContainer,
    ) -> AdminResult<Vec<RoleRepresentation>> {
        let realm = self.realm(realm).await?;
        let roles = self
            .registry
            .list_resources(&container.scope(realm.id), ResourceType::Role)
            .await?;
        Ok(roles.into_iter().map(Into::into).collect())
    }

    /// Deletes a role by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container has no role with the name.
    #[instrument(skip(self))]
    pub async fn delete_role(
        &self,
        realm: &str,
        container: RoleContainer,
        name: &str,
    ) -> AdminResult<()> {
        let realm = self.realm(realm).await?;
        let scope = container.scope(realm.id);
        let role = self.role(scope, name).await?;
        let deleted = self.registry.delete_resource(&scope, role.id).await?;
        self.emit(resource_event(EventType::RoleDeleted, &deleted)).await;
        Ok(())
    }

    // ---- attribute mappers --------------------------------------------

    /// Validates and registers an attribute mapper.
    ///
    /// Nothing is registered if the configuration is rejected.
    ///
    /// # Errors
    ///
    /// - `InvalidMapperConfig` listing every missing key
    /// - `Conflict` if the mapper ID is taken
    #[instrument(skip(self, mapper), fields(name = %mapper.name, provider_id = %mapper.provider_id))]
    pub async fn register_mapper(
        &self,
        mapper: MapperRepresentation,
    ) -> AdminResult<MapperRepresentation> {
        let registered = self.mappers.register(mapper.into_config())?;
        self.emit(
            Event::builder(EventType::MapperRegistered)
                .resource(registered.config.id, registered.config.name.clone())
                .detail("mapper_type", registered.config.mapper_type.clone())
                .detail("parent_id", registered.config.parent_id.to_string()),
        )
        .await;
        Ok(registered.into())
    }

    /// Lists the mappers of a federation provider.
    #[must_use]
    pub fn list_mappers(&self, parent_id: Uuid) -> Vec<MapperRepresentation> {
        self.mappers
            .list(parent_id)
            .into_iter()
            .map(Into::into)
            .collect()
    }

    /// Removes a mapper.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no mapper has the ID.
    pub fn remove_mapper(&self, id: Uuid) -> AdminResult<()> {
        self.mappers.remove(id)?;
        Ok(())
    }

    /// Runs a mapper over a client's custom attributes.
    ///
    /// An import stores the mapped attributes on the client and returns
    /// them. An export returns the attributes to write to the external
    /// directory, which is empty for read-only mappers.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the client or mapper does not exist
    /// - `BadRequest` if an import targets a reserved client attribute
    /// - `StaleVersion` if the client changed while the import ran
    #[instrument(skip(self, request), fields(mapper_id = %request.mapper_id, direction = ?request.direction))]
    pub async fn sync_client_attributes(
        &self,
        realm: &str,
        client_id: Uuid,
        request: SyncRequest,
    ) -> AdminResult<Attributes> {
        let realm = self.realm(realm).await?;
        let client = self.client(realm.id, client_id).await?;
        let mapper = self
            .mappers
            .get(request.mapper_id)
            .ok_or(FederationError::MapperNotFound(request.mapper_id))?;

        let (reserved, custom) = split_reserved(&client.attributes, CLIENT_RESERVED);
        let synced = mapper
            .mapper
            .sync(request.direction, &custom, &request.external)?;

        if request.direction == SyncDirection::Import {
            if let Some(key) = synced.keys().find(|key| CLIENT_RESERVED.contains(&key.as_str())) {
                return Err(AdminError::BadRequest(format!(
                    "mapper '{}' imports into reserved client attribute '{key}'",
                    mapper.config.name
                )));
            }
        }

        if request.direction == SyncDirection::Export || synced == custom {
            debug!(changed = false, "no local attribute changes");
            return Ok(synced);
        }

        let mut stored = synced.clone();
        stored.extend(reserved);
        let updated = self
            .registry
            .update_attributes(&client.scope, client.id, client.version, &stored)
            .await?;

        self.emit(
            resource_event(EventType::AttributesSynced, &updated)
                .detail("mapper_id", request.mapper_id.to_string())
                .detail("version", updated.version.to_string()),
        )
        .await;
        Ok(synced)
    }

    // ---- helpers ------------------------------------------------------

    async fn realm(&self, name: &str) -> AdminResult<Realm> {
        Ok(self.registry.find_realm(name).await?)
    }

    async fn client(&self, realm_id: Uuid, id: Uuid) -> AdminResult<Resource> {
        Ok(self
            .registry
            .get_resource(
                &ResourceScope::realm(realm_id),
                ResourceType::Client,
                &ResourceLookup::Id(id),
            )
            .await?)
    }

    async fn role(&self, scope: ResourceScope, name: &str) -> AdminResult<Resource> {
        Ok(self
            .registry
            .get_resource(&scope, ResourceType::Role, &ResourceLookup::Name(name.to_string()))
            .await?)
    }

    async fn emit(&self, event: EventBuilder) {
        let event = event.node(self.registry.node_id()).build();
        if let Err(err) = self.events.log(event).await {
            warn!(error = %err, "failed to log admin event");
        }
    }
}

fn resource_event(event_type: EventType, resource: &Resource) -> EventBuilder {
    Event::builder(event_type)
        .realm(resource.realm_id())
        .resource(resource.id, resource.name.clone())
        .detail("resource_type", resource.resource_type.as_str())
}
