//! Attribute mapper factories and the built-in mappers.
//!
//! A factory describes the configuration a mapper type accepts and builds
//! mapper instances from a validated [`MapperConfig`]. Mappers translate
//! between a resource's attributes and the attributes held by an external
//! directory.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use kc_model::Attributes;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{FederationError, FederationResult};

/// Configuration for an attribute mapper instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Mapper ID.
    pub id: Uuid,
    /// Mapper name.
    pub name: String,
    /// Mapper type, the ID of the factory that builds it.
    pub mapper_type: String,
    /// Federation provider the mapper belongs to.
    pub parent_id: Uuid,
    /// Configuration properties.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl MapperConfig {
    /// Creates a new mapper configuration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        mapper_type: impl Into<String>,
        parent_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            mapper_type: mapper_type.into(),
            parent_id,
            config: HashMap::new(),
        }
    }

    /// Adds a configuration property.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Gets a configuration value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Gets a non-blank configuration value.
    #[must_use]
    pub fn get_non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Reads a boolean property, falling back to `default` when unset.
    ///
    /// ## Errors
    ///
    /// Returns `FederationError::InvalidConfig` when the value is neither
    /// `true` nor `false`.
    pub fn get_bool(&self, key: &str, default: bool) -> FederationResult<bool> {
        match self.get_non_blank(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(FederationError::invalid_config(key, v, "expected true or false")),
        }
    }
}

/// Direction of an attribute sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// External directory to resource.
    Import,
    /// Resource to external directory.
    Export,
}

/// Value type of a configuration property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigPropertyType {
    /// Free text.
    String,
    /// `true` or `false`.
    Boolean,
}

/// Describes one configuration property a factory accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigProperty {
    /// Property key.
    pub name: &'static str,
    /// Human readable label.
    pub label: &'static str,
    /// Help text.
    pub help_text: &'static str,
    /// Value type.
    pub property_type: ConfigPropertyType,
    /// Default value, if any.
    pub default_value: Option<&'static str>,
    /// Whether the property must be set.
    pub required: bool,
}

/// A configured attribute mapper.
pub trait AttributeMapper: Send + Sync + Debug {
    /// Type of this mapper.
    fn mapper_type(&self) -> &'static str;

    /// Whether the external directory must never be written.
    fn is_read_only(&self) -> bool;

    /// Applies external attributes to a copy of the resource's attributes.
    fn import(&self, resource: &Attributes, external: &Attributes) -> Attributes;

    /// Produces the external attributes derived from a resource.
    fn export(&self, resource: &Attributes) -> Attributes;

    /// Syncs in the given direction and returns the updated attribute set.
    ///
    /// Imports return the resource's new attributes. Exports return the
    /// attributes to write externally, which is always empty for read-only
    /// mappers.
    ///
    /// ## Errors
    ///
    /// Returns `FederationError::AttributeMapping` if the mapper cannot
    /// produce a result.
    fn sync(
        &self,
        direction: SyncDirection,
        resource: &Attributes,
        external: &Attributes,
    ) -> FederationResult<Attributes> {
        match direction {
            SyncDirection::Import => Ok(self.import(resource, external)),
            SyncDirection::Export if self.is_read_only() => {
                debug!(mapper_type = self.mapper_type(), "Read-only mapper, skipping export");
                Ok(Attributes::new())
            }
            SyncDirection::Export => Ok(self.export(resource)),
        }
    }
}

/// Builds attribute mappers of one type.
pub trait AttributeMapperFactory: Send + Sync {
    /// Mapper type identifier.
    fn id(&self) -> &'static str;

    /// Display name of the mapper type.
    fn display_type(&self) -> &'static str;

    /// Help text shown for the mapper type.
    fn help_text(&self) -> &'static str;

    /// Properties the mapper type accepts.
    fn config_properties(&self) -> Vec<ConfigProperty>;

    /// Validates a configuration before any mapper is built.
    ///
    /// The default reports every missing required property at once, then
    /// checks that boolean properties parse.
    ///
    /// ## Errors
    ///
    /// Returns `FederationError::MissingConfig` or
    /// `FederationError::InvalidConfig`.
    fn validate_config(&self, config: &MapperConfig) -> FederationResult<()> {
        let properties = self.config_properties();

        let missing_keys: Vec<String> = properties
            .iter()
            .filter(|p| p.required && config.get_non_blank(p.name).is_none())
            .map(|p| p.name.to_string())
            .collect();
        if !missing_keys.is_empty() {
            return Err(FederationError::MissingConfig {
                mapper_type: self.id().to_string(),
                missing_keys,
            });
        }

        for property in properties
            .iter()
            .filter(|p| p.property_type == ConfigPropertyType::Boolean)
        {
            config.get_bool(property.name, false)?;
        }
        Ok(())
    }

    /// Builds a mapper from a validated configuration.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if a property cannot be used.
    fn create(&self, config: &MapperConfig) -> FederationResult<Arc<dyn AttributeMapper>>;
}

// ============================================================================
// User Attribute Mapper
// ============================================================================

/// Factory for [`UserAttributeMapper`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAttributeMapperFactory;

impl UserAttributeMapperFactory {
    /// Mapper type identifier.
    pub const PROVIDER_ID: &'static str = "user-attribute-ldap-mapper";
    /// Resource attribute name.
    pub const USER_ATTRIBUTE: &'static str = "user.model.attribute";
    /// External attribute name.
    pub const EXTERNAL_ATTRIBUTE: &'static str = "ldap.attribute";
    /// Never write to the external directory.
    pub const READ_ONLY: &'static str = "read.only";
    /// Let the external directory win on import.
    pub const ALWAYS_READ: &'static str = "always.read.value.from.ldap";
}

impl AttributeMapperFactory for UserAttributeMapperFactory {
    fn id(&self) -> &'static str {
        Self::PROVIDER_ID
    }

    fn display_type(&self) -> &'static str {
        "User Attribute"
    }

    fn help_text(&self) -> &'static str {
        "Maps a single external attribute to an attribute of the resource"
    }

    fn config_properties(&self) -> Vec<ConfigProperty> {
        vec![
            ConfigProperty {
                name: Self::USER_ATTRIBUTE,
                label: "User Model Attribute",
                help_text: "Name of the resource attribute to map to",
                property_type: ConfigPropertyType::String,
                default_value: None,
                required: true,
            },
            ConfigProperty {
                name: Self::EXTERNAL_ATTRIBUTE,
                label: "LDAP Attribute",
                help_text: "Name of the mapped attribute in the external directory",
                property_type: ConfigPropertyType::String,
                default_value: None,
                required: true,
            },
            ConfigProperty {
                name: Self::READ_ONLY,
                label: "Read Only",
                help_text: "Changes are never written to the external directory",
                property_type: ConfigPropertyType::Boolean,
                default_value: Some("false"),
                required: false,
            },
            ConfigProperty {
                name: Self::ALWAYS_READ,
                label: "Always Read Value From LDAP",
                help_text: "The external value replaces the local one, even when absent",
                property_type: ConfigPropertyType::Boolean,
                default_value: Some("false"),
                required: false,
            },
        ]
    }

    fn create(&self, config: &MapperConfig) -> FederationResult<Arc<dyn AttributeMapper>> {
        Ok(Arc::new(UserAttributeMapper {
            user_attribute: required(config, Self::USER_ATTRIBUTE)?,
            external_attribute: required(config, Self::EXTERNAL_ATTRIBUTE)?,
            read_only: config.get_bool(Self::READ_ONLY, false)?,
            always_read_external: config.get_bool(Self::ALWAYS_READ, false)?,
        }))
    }
}

/// Maps one external attribute to one resource attribute.
#[derive(Debug, Clone)]
pub struct UserAttributeMapper {
    user_attribute: String,
    external_attribute: String,
    read_only: bool,
    always_read_external: bool,
}

impl AttributeMapper for UserAttributeMapper {
    fn mapper_type(&self) -> &'static str {
        UserAttributeMapperFactory::PROVIDER_ID
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn import(&self, resource: &Attributes, external: &Attributes) -> Attributes {
        let mut result = resource.clone();
        match external.get(&self.external_attribute) {
            Some(values) => {
                result.insert(self.user_attribute.clone(), values.clone());
            }
            None if self.always_read_external => {
                result.remove(&self.user_attribute);
            }
            None => {}
        }
        result
    }

    fn export(&self, resource: &Attributes) -> Attributes {
        resource
            .get(&self.user_attribute)
            .map(|values| Attributes::from([(self.external_attribute.clone(), values.clone())]))
            .unwrap_or_default()
    }
}

// ============================================================================
// Full Name Mapper
// ============================================================================

/// Factory for [`FullNameMapper`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FullNameMapperFactory;

impl FullNameMapperFactory {
    /// Mapper type identifier.
    pub const PROVIDER_ID: &'static str = "full-name-ldap-mapper";
    /// External attribute holding the full name.
    pub const FULL_NAME_ATTRIBUTE: &'static str = "ldap.full.name.attribute";
    /// Never write to the external directory.
    pub const READ_ONLY: &'static str = "read.only";
    /// Resource attribute for the first name.
    pub const FIRST_NAME: &'static str = "firstName";
    /// Resource attribute for the last name.
    pub const LAST_NAME: &'static str = "lastName";
}

impl AttributeMapperFactory for FullNameMapperFactory {
    fn id(&self) -> &'static str {
        Self::PROVIDER_ID
    }

    fn display_type(&self) -> &'static str {
        "Full Name"
    }

    fn help_text(&self) -> &'static str {
        "Splits an external full name into first and last name attributes"
    }

    fn config_properties(&self) -> Vec<ConfigProperty> {
        vec![
            ConfigProperty {
                name: Self::FULL_NAME_ATTRIBUTE,
                label: "LDAP Full Name Attribute",
                help_text: "Name of the external attribute holding the full name, usually 'cn'",
                property_type: ConfigPropertyType::String,
                default_value: Some("cn"),
                required: true,
            },
            ConfigProperty {
                name: Self::READ_ONLY,
                label: "Read Only",
                help_text: "Changes are never written to the external directory",
                property_type: ConfigPropertyType::Boolean,
                default_value: Some("false"),
                required: false,
            },
        ]
    }

    fn create(&self, config: &MapperConfig) -> FederationResult<Arc<dyn AttributeMapper>> {
        Ok(Arc::new(FullNameMapper {
            external_attribute: required(config, Self::FULL_NAME_ATTRIBUTE)?,
            read_only: config.get_bool(Self::READ_ONLY, false)?,
        }))
    }
}

/// Splits a full name into first and last name on import, joins on export.
#[derive(Debug, Clone)]
pub struct FullNameMapper {
    external_attribute: String,
    read_only: bool,
}

impl AttributeMapper for FullNameMapper {
    fn mapper_type(&self) -> &'static str {
        FullNameMapperFactory::PROVIDER_ID
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn import(&self, resource: &Attributes, external: &Attributes) -> Attributes {
        let mut result = resource.clone();
        let Some(full_name) = first_value(external, &self.external_attribute) else {
            return result;
        };

        // A single word is treated as a last name.
        match full_name.trim().rsplit_once(' ') {
            Some((first, last)) => {
                result.insert(FullNameMapperFactory::FIRST_NAME.to_string(), vec![first.trim().to_string()]);
                result.insert(FullNameMapperFactory::LAST_NAME.to_string(), vec![last.to_string()]);
            }
            None => {
                result.remove(FullNameMapperFactory::FIRST_NAME);
                result.insert(FullNameMapperFactory::LAST_NAME.to_string(), vec![full_name.trim().to_string()]);
            }
        }
        result
    }

    fn export(&self, resource: &Attributes) -> Attributes {
        let parts: Vec<&str> = [FullNameMapperFactory::FIRST_NAME, FullNameMapperFactory::LAST_NAME]
            .into_iter()
            .filter_map(|key| first_value(resource, key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();

        if parts.is_empty() {
            return Attributes::new();
        }
        Attributes::from([(self.external_attribute.clone(), vec![parts.join(" ")])])
    }
}

fn required(config: &MapperConfig, key: &str) -> FederationResult<String> {
    config
        .get_non_blank(key)
        .map(ToString::to_string)
        .ok_or_else(|| FederationError::MissingConfig {
            mapper_type: config.mapper_type.clone(),
            missing_keys: vec![key.to_string()],
        })
}

fn first_value<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(|values| values.first())
        .map(String::as_str)
}
