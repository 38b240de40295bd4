//! SQL storage error types.

use kc_storage::StorageError;
use sqlx::Error as SqlxError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const QUERY_CANCELED: &str = "57014";

/// Converts a `SQLx` error to a storage error.
#[allow(clippy::needless_pass_by_value)]
pub fn from_sqlx_error(err: SqlxError) -> StorageError {
    match err {
        SqlxError::RowNotFound => StorageError::Internal("Row not found".to_string()),
        SqlxError::Database(db_err) => match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => StorageError::Duplicate {
                entity_type: "Entity",
                field: "unique key",
                value: db_err.constraint().unwrap_or_default().to_string(),
            },
            Some(FOREIGN_KEY_VIOLATION) => {
                StorageError::InvalidReference(db_err.message().to_string())
            }
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                StorageError::Transaction(db_err.message().to_string())
            }
            Some(QUERY_CANCELED) => StorageError::Timeout(db_err.message().to_string()),
            _ => StorageError::Query(db_err.to_string()),
        },
        SqlxError::PoolTimedOut => StorageError::Connection("Connection pool timeout".to_string()),
        SqlxError::PoolClosed => StorageError::Connection("Connection pool closed".to_string()),
        SqlxError::Io(io) => StorageError::Connection(io.to_string()),
        SqlxError::ColumnDecode { .. } | SqlxError::Decode(_) => {
            StorageError::Serialization(err.to_string())
        }
        _ => StorageError::Internal(err.to_string()),
    }
}

/// Converts an insert error, naming the conflicting value on a unique violation.
pub fn from_insert_error(
    err: SqlxError,
    entity_type: &'static str,
    field: &'static str,
    value: &str,
) -> StorageError {
    match from_sqlx_error(err) {
        StorageError::Duplicate { .. } => StorageError::duplicate(entity_type, field, value),
        other => other,
    }
}
