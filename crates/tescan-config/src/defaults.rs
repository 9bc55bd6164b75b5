//! Built-in defaults for every scanner setting.
//!
//! # Design
//! - Defaults are relative to the working directory, matching the legacy layout.
//! - Keep numeric defaults explicit so config summaries are auditable.

pub(crate) const INPUT_DIRECTORY: &str = "input_files";
pub(crate) const REPORTS_DIRECTORY: &str = "te_response_data";
pub(crate) const BENIGN_DIRECTORY: &str = "benign_files";
pub(crate) const QUARANTINE_DIRECTORY: &str = "quarantine_files";
pub(crate) const ERROR_DIRECTORY: &str = "error_files";
pub(crate) const CONCURRENCY: usize = 4;
pub(crate) const SECONDS_TO_WAIT: u64 = 15;
pub(crate) const MAX_RETRIES: u32 = 120;
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Config file consulted when none is given explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TE_";
/// TLS port the appliance serves its file API on.
pub const APPLIANCE_PORT: u16 = 18194;
/// Path of the file API below the appliance host.
pub const APPLIANCE_API_PATH: &str = "/tecloud/api/v1/file/";
