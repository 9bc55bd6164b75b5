//! Telemetry primitives shared across the tescan workspace.
//!
//! This crate centralises logging setup and span helpers so the scanner's
//! binaries and libraries emit consistent structured records.
#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

pub mod context;
pub mod error;
pub mod init;

pub use context::{RunContextGuard, file_span};
pub use error::{Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, UnknownLogFormat, build_sha, init_logging,
};
