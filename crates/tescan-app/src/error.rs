//! # Design
//!
//! - Centralize application-level errors for bootstrap and scanning.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.
//! - Per-file failures are classified by [`FailureKind`]; the policy table decides
//!   whether they propagate, redirect the file to the error tree, or are only logged.

use std::io;
use std::path::PathBuf;

use tescan_appliance::ApplianceError;
use tescan_config::ConfigError;
use tescan_fsops::FsOpsError;
use tescan_telemetry::TelemetryError;
use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Result alias for a single file's verdict session.
pub type SessionResult<T> = Result<T, SessionError>;

/// Exit code for configuration and validation problems.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for operational failures before or around the scan.
pub const EXIT_FAILURE: u8 = 3;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: TelemetryError,
    },
    /// Filesystem preflight or discovery failed.
    #[error("filesystem operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source filesystem error.
        source: FsOpsError,
    },
    /// The appliance client could not be constructed.
    #[error("appliance operation failed")]
    Appliance {
        /// Operation identifier.
        operation: &'static str,
        /// Source appliance error.
        source: ApplianceError,
    },
    /// A blocking helper task did not complete.
    #[error("background task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(operation: &'static str, source: TelemetryError) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn fsops(operation: &'static str, source: FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) const fn appliance(operation: &'static str, source: ApplianceError) -> Self {
        Self::Appliance { operation, source }
    }

    /// Process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } => EXIT_CONFIG,
            Self::Telemetry { .. }
            | Self::FsOps { .. }
            | Self::Appliance { .. }
            | Self::Join { .. } => EXIT_FAILURE,
        }
    }
}

/// Failure raised while driving one file through the appliance.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The content hash could not be computed.
    #[error("failed to hash file")]
    Hash {
        /// File being hashed.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// An appliance call failed.
    #[error("appliance call failed")]
    Appliance {
        /// Operation identifier (`cache_query`, `upload`, `poll`, `download`).
        operation: &'static str,
        /// Source appliance error.
        source: ApplianceError,
    },
    /// A response or report artifact could not be written.
    #[error("failed to write artifact")]
    Artifact {
        /// Operation identifier.
        operation: &'static str,
        /// Artifact path.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// A file move exhausted its attempts.
    #[error("file relocation failed")]
    Relocation {
        /// Destination path.
        destination: PathBuf,
        /// Relocator summary.
        message: String,
    },
    /// A blocking helper task did not complete.
    #[error("background task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl SessionError {
    pub(crate) const fn appliance(operation: &'static str, source: ApplianceError) -> Self {
        Self::Appliance { operation, source }
    }

    pub(crate) const fn join(operation: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Join { operation, source }
    }
}

/// Closed set of per-file failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Cache check or status query failed in transit.
    Transport,
    /// The upload itself failed.
    Upload,
    /// Moving the file exhausted the relocator's attempts.
    Relocation,
    /// Downloading or writing the detailed report failed.
    ReportFetch,
}

/// What a session does with a failure of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the error to the coordinator, which logs it and moves on.
    Propagate,
    /// Move the file to the error tree and stop processing it.
    RedirectToError,
    /// Log and continue.
    LogOnly,
}

impl FailureKind {
    /// Policy applied to this kind of failure.
    #[must_use]
    pub const fn policy(self) -> FailurePolicy {
        match self {
            Self::Transport => FailurePolicy::Propagate,
            Self::Upload => FailurePolicy::RedirectToError,
            Self::Relocation | Self::ReportFetch => FailurePolicy::LogOnly,
        }
    }

    /// Stable label for structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Upload => "upload",
            Self::Relocation => "relocation",
            Self::ReportFetch => "report_fetch",
        }
    }
}
