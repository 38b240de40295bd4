//! Registry of mapper factories and configured mappers.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{FederationError, FederationResult};
use crate::mapper::{
    AttributeMapper, AttributeMapperFactory, FullNameMapperFactory, MapperConfig,
    UserAttributeMapperFactory,
};

/// A mapper together with the configuration it was built from.
#[derive(Debug, Clone)]
pub struct RegisteredMapper {
    /// Validated configuration.
    pub config: MapperConfig,
    /// Mapper instance.
    pub mapper: Arc<dyn AttributeMapper>,
}

/// Holds mapper factories by type and configured mappers by ID.
///
/// Registration validates the configuration in full before anything is
/// stored, so a rejected mapper leaves no trace.
#[derive(Default)]
pub struct MapperRegistry {
    factories: DashMap<&'static str, Arc<dyn AttributeMapperFactory>>,
    mappers: DashMap<Uuid, RegisteredMapper>,
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("factories", &self.factory_ids())
            .field("mappers", &self.mappers.len())
            .finish()
    }
}

impl MapperRegistry {
    /// Creates a registry without any factories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in factories.
    #[must_use]
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry
            .factories
            .insert(UserAttributeMapperFactory::PROVIDER_ID, Arc::new(UserAttributeMapperFactory));
        registry
            .factories
            .insert(FullNameMapperFactory::PROVIDER_ID, Arc::new(FullNameMapperFactory));
        registry
    }

    /// Adds a factory.
    ///
    /// ## Errors
    ///
    /// Returns `FederationError::DuplicateFactory` if the ID is taken.
    pub fn register_factory(&self, factory: Arc<dyn AttributeMapperFactory>) -> FederationResult<()> {
        match self.factories.entry(factory.id()) {
            Entry::Occupied(_) => Err(FederationError::DuplicateFactory(factory.id().to_string())),
            Entry::Vacant(slot) => {
                debug!(factory = factory.id(), "Registered mapper factory");
                slot.insert(factory);
                Ok(())
            }
        }
    }

    /// Gets a factory by type.
    #[must_use]
    pub fn factory(&self, mapper_type: &str) -> Option<Arc<dyn AttributeMapperFactory>> {
        self.factories.get(mapper_type).map(|f| Arc::clone(f.value()))
    }

    /// Registered factory IDs, sorted.
    #[must_use]
    pub fn factory_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.factories.iter().map(|f| *f.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Validates a configuration, builds the mapper and stores it.
    ///
    /// ## Errors
    ///
    /// - `FederationError::UnknownMapperType` if no factory matches
    /// - `FederationError::MissingConfig` listing every missing key
    /// - `FederationError::InvalidConfig` for unusable values
    /// - `FederationError::DuplicateMapper` if the ID is taken
    #[instrument(skip(self, config), fields(mapper_type = %config.mapper_type, name = %config.name))]
    pub fn register(&self, config: MapperConfig) -> FederationResult<RegisteredMapper> {
        let factory = self
            .factory(&config.mapper_type)
            .ok_or_else(|| FederationError::UnknownMapperType(config.mapper_type.clone()))?;

        factory.validate_config(&config)?;
        let mapper = factory.create(&config)?;

        match self.mappers.entry(config.id) {
            Entry::Occupied(_) => Err(FederationError::DuplicateMapper(config.id)),
            Entry::Vacant(slot) => {
                let registered = RegisteredMapper { config, mapper };
                slot.insert(registered.clone());
                info!(mapper_id = %registered.config.id, "Registered attribute mapper");
                Ok(registered)
            }
        }
    }

    /// Gets a mapper by ID.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<RegisteredMapper> {
        self.mappers.get(&id).map(|m| m.value().clone())
    }

    /// Removes a mapper.
    ///
    /// ## Errors
    ///
    /// Returns `FederationError::MapperNotFound` if no mapper has the ID.
    pub fn remove(&self, id: Uuid) -> FederationResult<RegisteredMapper> {
        self.mappers
            .remove(&id)
            .map(|(_, m)| m)
            .ok_or(FederationError::MapperNotFound(id))
    }

    /// Mappers belonging to a federation provider, sorted by name.
    #[must_use]
    pub fn list(&self, parent_id: Uuid) -> Vec<RegisteredMapper> {
        let mut mappers: Vec<_> = self
            .mappers
            .iter()
            .filter(|m| m.config.parent_id == parent_id)
            .map(|m| m.value().clone())
            .collect();
        mappers.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        mappers
    }
}
