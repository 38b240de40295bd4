//! Federation error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while registering or running attribute mappers.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Mandatory configuration keys are missing.
    #[error("mapper '{mapper_type}' is missing required configuration: {}", missing_keys.join(", "))]
    MissingConfig {
        /// Mapper type being configured.
        mapper_type: String,
        /// Every missing key, in declaration order.
        missing_keys: Vec<String>,
    },

    /// A configuration value is present but unusable.
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No factory is registered under the requested type.
    #[error("unknown mapper type: {0}")]
    UnknownMapperType(String),

    /// A factory with the same ID is already registered.
    #[error("mapper factory '{0}' is already registered")]
    DuplicateFactory(String),

    /// A mapper with the same ID is already registered.
    #[error("mapper {0} is already registered")]
    DuplicateMapper(Uuid),

    /// No mapper is registered under the requested ID.
    #[error("mapper {0} not found")]
    MapperNotFound(Uuid),

    /// Mapping an attribute set failed.
    #[error("attribute mapping error: {0}")]
    AttributeMapping(String),
}

impl FederationError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Checks if the error means the configuration was rejected.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig { .. } | Self::InvalidConfig { .. } | Self::UnknownMapperType(_)
        )
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
