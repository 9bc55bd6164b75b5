use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tescan_appliance::{Appliance, ApplianceClient};
use tescan_config::{ConfigLoader, ScannerConfig};
use tescan_fsops::{
    DirectoryMode, DirectoryStatus, FilenameCodec, FsOpsResult, PathClassifier, PreflightPolicy,
    ensure_directory,
};
use tescan_telemetry::{LoggingConfig, RunContextGuard, build_sha, init_logging};
use tracing::{Span, info};

use crate::cli::Cli;
use crate::coordinator::{ScanCoordinator, ScanSummary};
use crate::error::{AppError, AppResult};
use crate::session::{Destinations, PollPolicy, SessionContext};

/// Everything a scan needs, resolved before any file is touched.
pub struct ScanDependencies {
    config: ScannerConfig,
    appliance: Arc<dyn Appliance>,
}

impl ScanDependencies {
    /// Production dependencies: an HTTPS client for the configured appliance.
    ///
    /// # Errors
    ///
    /// Returns an error when the appliance URL or HTTP client cannot be built.
    pub fn from_config(config: ScannerConfig) -> AppResult<Self> {
        let base_url = config
            .appliance_url()
            .map_err(|err| AppError::config("config.appliance_url", err))?;
        let client = ApplianceClient::new(base_url, config.request_timeout())
            .map_err(|err| AppError::appliance("appliance.client", err))?;
        Ok(Self::with_appliance(config, Arc::new(client)))
    }

    /// Dependencies with a caller-supplied appliance.
    #[must_use]
    pub fn with_appliance(config: ScannerConfig, appliance: Arc<dyn Appliance>) -> Self {
        Self { config, appliance }
    }
}

/// Entry point for the `tescan` binary.
///
/// # Errors
///
/// Returns an error if configuration, logging, preflight or discovery fails.
/// Individual file failures are logged and counted instead.
pub async fn run_app() -> AppResult<ScanSummary> {
    let cli = Cli::parse();
    let config = load_config(&cli, ConfigLoader::from_process_env())?;

    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: config.log_format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let context = RunContextGuard::new();
    info!(run_id = %context.run_id(), "tescan starting");

    let dependencies = ScanDependencies::from_config(config)?;
    run_scan(dependencies).await
}

/// Merge the command line over `loader`'s environment and files.
///
/// # Errors
///
/// Returns [`AppError::Config`] when any layer is invalid.
pub fn load_config(cli: &Cli, loader: ConfigLoader) -> AppResult<ScannerConfig> {
    loader
        .with_config_file(cli.config.clone())
        .with_overrides(cli.overrides())
        .load()
        .map_err(|err| AppError::config("config.load", err))
}

/// Preflight the directory tree and run one scan.
///
/// # Errors
///
/// Returns an error if a directory is unusable or the input tree cannot be walked.
pub async fn run_scan(dependencies: ScanDependencies) -> AppResult<ScanSummary> {
    let ScanDependencies { config, appliance } = dependencies;
    let classifier = PathClassifier::default();

    log_configuration(&config, &classifier);
    preflight(&config, classifier).await?;

    let context = SessionContext::new(
        appliance,
        Arc::new(FilenameCodec::new()),
        Destinations::from_config(&config),
        PollPolicy::from_config(&config),
    );
    ScanCoordinator::new(
        Arc::new(context),
        config.input_directory.clone(),
        config.concurrency,
    )
    .run()
    .await
}

fn log_configuration(config: &ScannerConfig, classifier: &PathClassifier) {
    info!(
        input_directory = %config.input_directory.display(),
        reports_directory = %config.reports_directory.display(),
        benign_directory = %config.benign_directory.display(),
        quarantine_directory = %config.quarantine_directory.display(),
        error_directory = %config.error_directory.display(),
        appliance_ip = %config.appliance_ip,
        concurrency = config.concurrency,
        seconds_to_wait = config.seconds_to_wait,
        max_retries = config.max_retries,
        request_timeout_secs = config.request_timeout_secs,
        "configuration loaded"
    );
    for (field, path) in std::iter::once(("input_directory", config.input_directory.as_path()))
        .chain(config.output_roots())
    {
        if classifier.is_network_path(path) {
            info!(field, path = %path.display(), "network path; moves are checksum verified");
        }
    }
}

async fn preflight(config: &ScannerConfig, classifier: PathClassifier) -> AppResult<()> {
    let checks: Vec<(PathBuf, DirectoryMode)> =
        std::iter::once((config.input_directory.clone(), DirectoryMode::MustExist))
            .chain(
                config
                    .output_roots()
                    .into_iter()
                    .map(|(_, path)| (path.to_path_buf(), DirectoryMode::CreateIfMissing)),
            )
            .collect();
    let span = Span::current();

    tokio::task::spawn_blocking(move || span.in_scope(|| ensure_all(&checks, &classifier)))
        .await
        .map_err(|source| AppError::Join {
            operation: "preflight",
            source,
        })?
        .map_err(|err| AppError::fsops("preflight", err))
}

fn ensure_all(checks: &[(PathBuf, DirectoryMode)], classifier: &PathClassifier) -> FsOpsResult<()> {
    let policy = PreflightPolicy::default();
    for (path, mode) in checks {
        if ensure_directory(path, *mode, classifier, &policy)? == DirectoryStatus::Created {
            info!(path = %path.display(), "created directory");
        }
    }
    Ok(())
}
