//! # Design
//!
//! - Constant error messages; request context lives in fields.
//! - Transport, HTTP status and payload decoding failures stay distinguishable so the
//!   session can apply its failure policy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for appliance calls.
pub type ApplianceResult<T> = Result<T, ApplianceError>;

/// Underlying cause of a payload decoding failure.
#[derive(Debug, Error)]
pub enum DecodeSource {
    /// Body was not the expected JSON document.
    #[error("invalid json payload")]
    Json(#[from] serde_json::Error),
    /// Report body was not valid base64.
    #[error("invalid base64 payload")]
    Base64(#[from] base64::DecodeError),
}

/// Errors raised while talking to the appliance.
#[derive(Debug, Error)]
pub enum ApplianceError {
    /// The HTTP client could not be constructed.
    #[error("failed to build appliance http client")]
    ClientBuild {
        /// Underlying reqwest error.
        source: reqwest::Error,
    },
    /// An endpoint URL could not be derived from the base URL.
    #[error("invalid appliance endpoint")]
    Endpoint {
        /// Endpoint that was being resolved.
        endpoint: &'static str,
        /// Underlying URL error.
        source: url::ParseError,
    },
    /// Connection, TLS, timeout or body transfer failure.
    #[error("appliance request failed")]
    Http {
        /// Operation being performed.
        operation: &'static str,
        /// Underlying reqwest error.
        source: reqwest::Error,
    },
    /// Non-success HTTP status without a usable body.
    #[error("appliance returned an error status")]
    Status {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Body text, truncated.
        body: String,
    },
    /// The response body could not be decoded.
    #[error("appliance response could not be decoded")]
    Decode {
        /// Operation being performed.
        operation: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Underlying decoding error, when one exists.
        source: Option<DecodeSource>,
    },
    /// Local file access failed while preparing a request.
    #[error("appliance upload file access failed")]
    Io {
        /// Operation being performed.
        operation: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl ApplianceError {
    /// Whether the failure happened on the wire rather than in local preparation.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Status { .. } | Self::Decode { .. }
        )
    }
}
