//! Typed scanner configuration.
//!
//! # Design
//! - Pure data carriers; IO and layering live in `loader.rs`.
//! - Every field is always populated, so consumers never handle missing values.

use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tescan_telemetry::LogFormat;
use url::Url;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};

/// Fully merged scanner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Root scanned recursively for input files.
    pub input_directory: PathBuf,
    /// Root receiving response and report artifacts.
    pub reports_directory: PathBuf,
    /// Root receiving files with a benign verdict.
    pub benign_directory: PathBuf,
    /// Root receiving files with a malicious verdict.
    pub quarantine_directory: PathBuf,
    /// Root receiving files that could not be scanned.
    pub error_directory: PathBuf,
    /// Address of the threat emulation appliance.
    pub appliance_ip: String,
    /// Maximum number of non-archive files handled at once.
    pub concurrency: usize,
    /// Delay between status queries.
    pub seconds_to_wait: u64,
    /// Upper bound on status queries per file.
    pub max_retries: u32,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Level directive handed to the log filter.
    pub log_level: String,
    /// Output format for log records.
    pub log_format: LogFormat,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            input_directory: PathBuf::from(defaults::INPUT_DIRECTORY),
            reports_directory: PathBuf::from(defaults::REPORTS_DIRECTORY),
            benign_directory: PathBuf::from(defaults::BENIGN_DIRECTORY),
            quarantine_directory: PathBuf::from(defaults::QUARANTINE_DIRECTORY),
            error_directory: PathBuf::from(defaults::ERROR_DIRECTORY),
            appliance_ip: String::new(),
            concurrency: defaults::CONCURRENCY,
            seconds_to_wait: defaults::SECONDS_TO_WAIT,
            max_retries: defaults::MAX_RETRIES,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            log_level: tescan_telemetry::DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::infer(),
        }
    }
}

impl ScannerConfig {
    /// Base URL of the appliance file API, always ending in `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ApplianceUrl`] when the address cannot form a URL host.
    pub fn appliance_url(&self) -> ConfigResult<Url> {
        let host = self.appliance_ip.trim();
        let host = if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        Url::parse(&format!(
            "https://{host}:{}{}",
            defaults::APPLIANCE_PORT,
            defaults::APPLIANCE_API_PATH
        ))
        .map_err(|source| ConfigError::ApplianceUrl {
            value: self.appliance_ip.clone(),
            source,
        })
    }

    /// Interval between status queries.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.seconds_to_wait)
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The four output roots with their field names, in creation order.
    #[must_use]
    pub fn output_roots(&self) -> [(&'static str, &Path); 4] {
        [
            ("reports_directory", self.reports_directory.as_path()),
            ("benign_directory", self.benign_directory.as_path()),
            ("quarantine_directory", self.quarantine_directory.as_path()),
            ("error_directory", self.error_directory.as_path()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_legacy_layout() {
        let config = ScannerConfig::default();
        assert_eq!(config.input_directory, PathBuf::from("input_files"));
        assert_eq!(config.reports_directory, PathBuf::from("te_response_data"));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.seconds_to_wait, 15);
        assert_eq!(config.max_retries, 120);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.appliance_ip.is_empty());
    }

    #[test]
    fn appliance_url_targets_file_api() -> anyhow::Result<()> {
        let config = ScannerConfig {
            appliance_ip: "10.0.0.5".to_string(),
            ..ScannerConfig::default()
        };
        assert_eq!(
            config.appliance_url()?.as_str(),
            "https://10.0.0.5:18194/tecloud/api/v1/file/"
        );
        Ok(())
    }

    #[test]
    fn appliance_url_brackets_ipv6() -> anyhow::Result<()> {
        let config = ScannerConfig {
            appliance_ip: "fd00::7".to_string(),
            ..ScannerConfig::default()
        };
        assert_eq!(
            config.appliance_url()?.as_str(),
            "https://[fd00::7]:18194/tecloud/api/v1/file/"
        );
        Ok(())
    }

    #[test]
    fn appliance_url_rejects_garbage_hosts() {
        let config = ScannerConfig {
            appliance_ip: "bad host".to_string(),
            ..ScannerConfig::default()
        };
        assert!(matches!(
            config.appliance_url(),
            Err(ConfigError::ApplianceUrl { .. })
        ));
    }
}
