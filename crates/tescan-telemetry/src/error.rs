//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// The configured log level could not be parsed into a filter.
    InvalidLevel {
        /// Level string that was rejected.
        value: String,
        /// Underlying filter parse error.
        source: tracing_subscriber::filter::ParseError,
    },
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberInstall { .. } => {
                formatter.write_str("failed to install tracing subscriber")
            }
            Self::InvalidLevel { .. } => formatter.write_str("invalid log level directive"),
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInstall { source } => Some(source),
            Self::InvalidLevel { source, .. } => Some(source),
        }
    }
}
