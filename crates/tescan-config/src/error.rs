//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A single problem found while validating a merged configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Field that failed validation.
    pub field: &'static str,
    /// Machine-readable reason for the failure.
    pub reason: &'static str,
    /// Offending value when available.
    pub value: Option<String>,
}

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Layer that supplied the value (`env`, `file`, `cli`).
        section: &'static str,
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The merged configuration failed one or more checks.
    #[error("configuration validation failed")]
    Validation {
        /// Every problem found, in field order.
        issues: Vec<ValidationIssue>,
    },
    /// An explicitly requested config file does not exist.
    #[error("configuration file not found")]
    FileMissing {
        /// Path that was requested.
        path: PathBuf,
    },
    /// The config file is not valid TOML.
    #[error("configuration file could not be parsed")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// The appliance URL could not be built from the configured address.
    #[error("invalid appliance address")]
    ApplianceUrl {
        /// Address supplied by the operator.
        value: String,
        /// Underlying URL error.
        source: url::ParseError,
    },
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_and_sources_preserved() {
        let err = ConfigError::Io {
            operation: "config.read",
            path: PathBuf::from("config.toml"),
            source: io::Error::other("denied"),
        };
        assert_eq!(err.to_string(), "filesystem operation failed");
        assert!(err.source().is_some());

        let err = ConfigError::Validation {
            issues: vec![ValidationIssue {
                field: "appliance_ip",
                reason: "required",
                value: None,
            }],
        };
        assert_eq!(err.to_string(), "configuration validation failed");
        assert!(err.source().is_none());
    }
}
