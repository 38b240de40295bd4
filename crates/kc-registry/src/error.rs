//! Registry error taxonomy.

use kc_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by the registry.
///
/// Every variant is distinguishable; store failures are classified rather
/// than wrapped in a catch-all.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name is already taken in the scope.
    #[error("{resource_type} '{name}' already exists")]
    Conflict {
        /// Kind of resource (e.g., "Client", "Role").
        resource_type: &'static str,
        /// The contested name.
        name: String,
    },

    /// The realm, scope or resource does not exist.
    #[error("{entity} {key} not found")]
    NotFound {
        /// Kind of entity.
        entity: &'static str,
        /// ID or name that was looked up.
        key: String,
    },

    /// Rejected before reaching the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store timed out or lost its connection.
    ///
    /// When `ambiguous` is set the write may have committed: check whether
    /// the resource exists before retrying with the same name.
    #[error("{operation} failed: {message}")]
    Transient {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying failure.
        message: String,
        /// Whether the write may have committed anyway.
        ambiguous: bool,
    },

    /// An update was based on an outdated version.
    #[error("resource {id} has version {actual}, update expected {expected}")]
    StaleVersion {
        /// Resource ID.
        id: Uuid,
        /// Version the caller sent.
        expected: i64,
        /// Version currently stored.
        actual: i64,
    },

    /// The store failed in a way retrying will not fix.
    #[error("internal registry error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Classifies a store failure from a read.
    #[must_use]
    pub fn from_read(operation: &'static str, err: StorageError) -> Self {
        Self::classify(operation, err, false)
    }

    /// Classifies a store failure from a write.
    ///
    /// Transient write failures are ambiguous: the commit may have landed.
    #[must_use]
    pub fn from_write(operation: &'static str, err: StorageError) -> Self {
        Self::classify(operation, err, true)
    }

    fn classify(operation: &'static str, err: StorageError, write: bool) -> Self {
        if err.is_transient() {
            return Self::Transient {
                operation,
                message: err.to_string(),
                ambiguous: write,
            };
        }
        match err {
            StorageError::Duplicate {
                entity_type, value, ..
            } => Self::Conflict {
                resource_type: entity_type,
                name: value,
            },
            StorageError::NotFound { entity_type, id } => Self::not_found(entity_type, id),
            StorageError::NotFoundByName { entity_type, name } => {
                Self::not_found(entity_type, format!("'{name}'"))
            }
            StorageError::InvalidReference(what) => Self::not_found("Scope", what),
            StorageError::VersionConflict {
                id,
                expected,
                actual,
                ..
            } => Self::StaleVersion {
                id,
                expected,
                actual,
            },
            StorageError::InvalidData(msg) => Self::InvalidInput(msg),
            other => Self::Internal(other.to_string()),
        }
    }

    /// Checks if this is a conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the same call may be repeated as-is.
    ///
    /// Ambiguous write failures are not: the caller must first check
    /// whether the write landed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient {
                ambiguous: false,
                ..
            }
        )
    }

    /// Whether a write may have committed despite failing.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Transient { ambiguous: true, .. })
    }
}
