//! Admin error types.
//!
//! Every registry and federation failure maps onto its own variant so that
//! a transport layer can tell conflicts, missing entities, bad input,
//! rejected mapper configuration and transient store failures apart.

use kc_federation::FederationError;
use kc_registry::RegistryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Resource not found.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        /// Type of entity (e.g., "Realm", "Client").
        entity_type: &'static str,
        /// Resource identifier.
        id: String,
    },

    /// Duplicate resource (unique constraint violation).
    #[error("{entity_type} already exists: {field} '{value}'")]
    Conflict {
        /// Type of entity.
        entity_type: &'static str,
        /// Field that caused the conflict.
        field: &'static str,
        /// Conflicting value.
        value: String,
    },

    /// Invalid request data.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An update was based on an outdated version.
    #[error("Stale version for {id}: expected {expected}, found {actual}")]
    StaleVersion {
        /// Resource ID.
        id: Uuid,
        /// Version the caller sent.
        expected: i64,
        /// Version currently stored.
        actual: i64,
    },

    /// Mapper configuration was rejected.
    #[error("Invalid mapper configuration: {message}")]
    InvalidMapperConfig {
        /// Description of the problem.
        message: String,
        /// Missing mandatory keys, if that was the problem.
        missing_keys: Vec<String>,
    },

    /// A mapper could not translate attributes.
    #[error("Attribute mapping failed: {0}")]
    Mapping(String),

    /// The store timed out or was unreachable.
    #[error("Service unavailable: {message}")]
    Unavailable {
        /// Underlying failure.
        message: String,
        /// Whether the write may have committed anyway.
        ambiguous: bool,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdminError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(
        entity_type: &'static str,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            entity_type,
            field,
            value: value.into(),
        }
    }

    /// Returns the HTTP status a transport should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } | Self::StaleVersion { .. } => 409,
            Self::BadRequest(_) | Self::InvalidMapperConfig { .. } => 400,
            Self::Mapping(_) => 422,
            Self::Unavailable { .. } => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::StaleVersion { .. } => "stale_version",
            Self::InvalidMapperConfig { .. } => "invalid_mapper_config",
            Self::Mapping(_) => "mapping_error",
            Self::Unavailable { .. } => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether repeating the same request is safe.
    ///
    /// Ambiguous failures are not: the write may already have committed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { ambiguous: false, .. })
    }

    /// Builds the response body for this error.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            Self::InvalidMapperConfig { missing_keys, .. } if !missing_keys.is_empty() => {
                Some(serde_json::json!({ "missingKeys": missing_keys }))
            }
            Self::Unavailable { ambiguous, .. } => {
                Some(serde_json::json!({ "ambiguous": ambiguous }))
            }
            Self::StaleVersion { actual, .. } => {
                Some(serde_json::json!({ "currentVersion": actual }))
            }
            _ => None,
        };
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
            details,
        }
    }
}

impl From<RegistryError> for AdminError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Conflict {
                resource_type,
                name,
            } => Self::conflict(resource_type, "name", name),
            RegistryError::NotFound { entity, key } => Self::not_found(entity, key),
            RegistryError::InvalidInput(message) => Self::BadRequest(message),
            RegistryError::StaleVersion {
                id,
                expected,
                actual,
            } => Self::StaleVersion {
                id,
                expected,
                actual,
            },
            err @ RegistryError::Transient { .. } => Self::Unavailable {
                ambiguous: err.is_ambiguous(),
                message: err.to_string(),
            },
            RegistryError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<FederationError> for AdminError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::MissingConfig {
                mapper_type,
                missing_keys,
            } => Self::InvalidMapperConfig {
                message: format!("mapper '{mapper_type}' is missing required configuration"),
                missing_keys,
            },
            err @ (FederationError::InvalidConfig { .. }
            | FederationError::UnknownMapperType(_)) => Self::InvalidMapperConfig {
                message: err.to_string(),
                missing_keys: Vec::new(),
            },
            FederationError::DuplicateFactory(id) => Self::conflict("Mapper factory", "id", id),
            FederationError::DuplicateMapper(id) => Self::conflict("Mapper", "id", id.to_string()),
            FederationError::MapperNotFound(id) => Self::not_found("Mapper", id.to_string()),
            FederationError::AttributeMapping(message) => Self::Mapping(message),
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Result type for admin operations.
pub type AdminResult<T> = Result<T, AdminError>;
