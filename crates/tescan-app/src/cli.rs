//! Command-line surface of the `tescan` binary.

use std::path::PathBuf;

use clap::Parser;
use tescan_config::ConfigLayer;
use tescan_telemetry::LogFormat;

/// Scan a directory tree with a threat emulation appliance and sort files by verdict.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "tescan", version, about)]
pub struct Cli {
    /// Directory whose files are scanned.
    #[arg(short = 'i', long, alias = "input_directory")]
    pub input_directory: Option<PathBuf>,
    /// Directory receiving response and report artifacts.
    #[arg(short = 'r', long, alias = "reports_directory")]
    pub reports_directory: Option<PathBuf>,
    /// Appliance address (IPv4, IPv6 or host name).
    #[arg(short = 'a', long, alias = "appliance_ip")]
    pub appliance_ip: Option<String>,
    /// Files scanned in parallel.
    #[arg(short = 'n', long, alias = "concurrency")]
    pub concurrency: Option<usize>,
    /// Directory receiving benign files.
    #[arg(short = 'o', long, alias = "benign_directory")]
    pub benign_directory: Option<PathBuf>,
    /// Directory receiving malicious files.
    #[arg(short = 'j', long, alias = "quarantine_directory")]
    pub quarantine_directory: Option<PathBuf>,
    /// Directory receiving files that errored.
    #[arg(short = 'e', long, alias = "error_directory")]
    pub error_directory: Option<PathBuf>,
    /// Seconds between status queries.
    #[arg(long, alias = "seconds_to_wait")]
    pub seconds_to_wait: Option<u64>,
    /// Status queries per file before giving up.
    #[arg(long, alias = "max_retries")]
    pub max_retries: Option<u32>,
    /// Per-request HTTP timeout in seconds.
    #[arg(long, alias = "request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,
    /// TOML configuration file; must exist when given.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log filter level, overridden by `RUST_LOG`.
    #[arg(long, alias = "log_level")]
    pub log_level: Option<String>,
    /// Log output format (`pretty` or `json`).
    #[arg(long, alias = "log_format")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Flags as the highest-precedence configuration layer.
    #[must_use]
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            input_directory: self.input_directory.clone(),
            reports_directory: self.reports_directory.clone(),
            benign_directory: self.benign_directory.clone(),
            quarantine_directory: self.quarantine_directory.clone(),
            error_directory: self.error_directory.clone(),
            appliance_ip: self.appliance_ip.clone(),
            concurrency: self.concurrency,
            seconds_to_wait: self.seconds_to_wait,
            max_retries: self.max_retries,
            request_timeout_secs: self.request_timeout_secs,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_and_legacy_flags_map_to_overrides() -> Result<()> {
        let cli = Cli::try_parse_from([
            "tescan",
            "-i",
            "in",
            "--reports_directory",
            "out",
            "-a",
            "192.0.2.7",
            "-n",
            "8",
            "--max_retries",
            "5",
            "--log-format",
            "json",
        ])?;
        let layer = cli.overrides();

        assert_eq!(layer.input_directory, Some(PathBuf::from("in")));
        assert_eq!(layer.reports_directory, Some(PathBuf::from("out")));
        assert_eq!(layer.appliance_ip.as_deref(), Some("192.0.2.7"));
        assert_eq!(layer.concurrency, Some(8));
        assert_eq!(layer.max_retries, Some(5));
        assert_eq!(layer.log_format, Some(LogFormat::Json));
        assert_eq!(layer.benign_directory, None);
        Ok(())
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(Cli::try_parse_from(["tescan", "--concurrency", "many"]).is_err());
        assert!(Cli::try_parse_from(["tescan", "--log-format", "xml"]).is_err());
    }
}
