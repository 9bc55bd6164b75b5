//! # Design
//!
//! - Provide structured, constant-message errors for discovery, preflight and relocation.
//! - Capture operation context (paths, fields) so failures are reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by the filesystem layer.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("fsops walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// A directory could not be made usable after every attempt.
    #[error("fsops directory unavailable")]
    DirectoryUnavailable {
        /// Directory that was checked.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
        /// Number of attempts performed.
        attempts: u32,
        /// Last IO error observed, when one was raised.
        source: Option<io::Error>,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }
}
