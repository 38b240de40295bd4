//! Attribute mapper DTOs.

use std::collections::HashMap;

use kc_federation::{MapperConfig, RegisteredMapper, SyncDirection};
use kc_model::Attributes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attribute mapper component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapperRepresentation {
    /// Mapper ID, generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Mapper name.
    pub name: String,
    /// Mapper type.
    pub provider_id: String,
    /// Federation provider the mapper belongs to.
    pub parent_id: Uuid,
    /// Configuration properties.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl MapperRepresentation {
    /// Converts this representation into a mapper configuration.
    #[must_use]
    pub fn into_config(self) -> MapperConfig {
        let mut config = MapperConfig::new(self.name, self.provider_id, self.parent_id);
        if let Some(id) = self.id {
            config.id = id;
        }
        config.config = self.config;
        config
    }
}

impl From<RegisteredMapper> for MapperRepresentation {
    fn from(mapper: RegisteredMapper) -> Self {
        let config = mapper.config;
        Self {
            id: Some(config.id),
            name: config.name,
            provider_id: config.mapper_type,
            parent_id: config.parent_id,
            config: config.config,
        }
    }
}

/// Request to sync a client's attributes through a mapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Mapper to run.
    pub mapper_id: Uuid,
    /// Sync direction.
    pub direction: SyncDirection,
    /// Attributes held by the external directory.
    #[serde(default)]
    pub external: Attributes,
}
