//! Error handling for configuration and startup.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configuration value could not be parsed.
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        /// Environment variable or config key.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Logging could not be initialized.
    #[error("logging error: {0}")]
    Logging(String),
}

impl Error {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
