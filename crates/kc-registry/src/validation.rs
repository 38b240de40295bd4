//! Input checks applied before any store interaction.

use kc_model::{ResourceScope, ResourceType};

use crate::error::{RegistryError, RegistryResult};

/// Longest accepted name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Validates a realm or resource name.
///
/// ## Errors
///
/// Returns `RegistryError::InvalidInput` for empty names, names with
/// surrounding whitespace or control characters, and overlong names.
pub fn validate_name(entity: &str, name: &str) -> RegistryResult<()> {
    if name.is_empty() {
        return Err(RegistryError::InvalidInput(format!(
            "{entity} name must not be empty"
        )));
    }
    if name.trim() != name {
        return Err(RegistryError::InvalidInput(format!(
            "{entity} name '{name}' has leading or trailing whitespace"
        )));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(RegistryError::InvalidInput(format!(
            "{entity} name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(RegistryError::InvalidInput(format!(
            "{entity} name contains control characters"
        )));
    }
    Ok(())
}

/// Validates that a resource type may live in a scope.
///
/// ## Errors
///
/// Returns `RegistryError::InvalidInput` for a client scoped to a client.
pub fn validate_placement(scope: &ResourceScope, resource_type: ResourceType) -> RegistryResult<()> {
    if resource_type == ResourceType::Client && scope.is_client_scope() {
        return Err(RegistryError::InvalidInput(
            "clients can only be created in a realm scope".to_string(),
        ));
    }
    Ok(())
}
