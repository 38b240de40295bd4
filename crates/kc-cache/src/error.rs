//! Cache error types.

use std::fmt;

/// Cache operation errors.
#[derive(Debug)]
pub enum CacheError {
    /// Connection to cache backend failed.
    Connection(String),
    /// Serialization/deserialization error.
    Serialization(String),
    /// The invalidation channel is closed.
    Closed,
    /// Invalid cache configuration.
    Configuration(String),
    /// Internal cache error.
    Internal(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "cache connection error: {msg}"),
            Self::Serialization(msg) => write!(f, "cache serialization error: {msg}"),
            Self::Closed => write!(f, "invalidation channel closed"),
            Self::Configuration(msg) => write!(f, "cache configuration error: {msg}"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
