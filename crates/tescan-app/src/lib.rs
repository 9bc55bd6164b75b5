#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Threat emulation scanner wiring.
//!
//! Layout: `session.rs` (per-file verdict state machine), `coordinator.rs`
//! (bounded fan-out and pruning), `cli.rs` (flags), `bootstrap.rs` (config,
//! logging, preflight), `error.rs` (error taxonomy and failure policy).

/// Application bootstrap and dependency wiring.
pub mod bootstrap;
/// Command-line flags.
pub mod cli;
/// Scan coordination across files.
pub mod coordinator;
/// Error types and the per-file failure policy.
pub mod error;
/// Verdict session state machine.
pub mod session;

pub use bootstrap::{ScanDependencies, load_config, run_app, run_scan};
pub use cli::Cli;
pub use coordinator::{ScanCoordinator, ScanSummary};
pub use error::{
    AppError, AppResult, EXIT_CONFIG, EXIT_FAILURE, FailureKind, FailurePolicy, SessionError,
    SessionResult,
};
pub use session::{Destination, Destinations, Phase, PollPolicy, SessionContext, VerdictSession};
