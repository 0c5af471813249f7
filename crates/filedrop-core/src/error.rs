//! Error types for Filedrop configuration.
//!
//! Runtime errors live with the crate that raises them (transfer, discovery,
//! receiver); this module covers loading and validating configuration.

use thiserror::Error;

/// Result type alias using ConfigError as the error type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Shorthand for an invalid field value.
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::invalid("transfer.request_timeout_secs", "cannot be 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'transfer.request_timeout_secs': cannot be 0"
        );
    }
}
