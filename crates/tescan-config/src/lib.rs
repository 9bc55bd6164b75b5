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

//! Layered configuration for the appliance scanner.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (env/file/cli layering),
//! `validate.rs` (invariants and path normalisation), `defaults.rs` (built-in values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::{APPLIANCE_API_PATH, APPLIANCE_PORT, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use error::{ConfigError, ConfigResult, ValidationIssue};
pub use loader::{ConfigLayer, ConfigLoader};
pub use model::ScannerConfig;
pub use validate::{normalize_path, validate};
