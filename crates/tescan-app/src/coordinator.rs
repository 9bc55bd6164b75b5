//! Fans discovered files out to verdict sessions.
//!
//! Regular files run concurrently behind a semaphore; archives follow one at a
//! time. A failing or panicking file is logged and counted, never fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tescan_fsops::{FileTask, discover_files, prune_empty_directories};
use tescan_telemetry::file_span;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument as _, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::session::{SessionContext, VerdictSession};

/// Counts reported at the end of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Files found under the input root.
    pub discovered: usize,
    /// How many of those were archives.
    pub archives: usize,
    /// Sessions that completed.
    pub succeeded: usize,
    /// Sessions that returned an error or panicked.
    pub failed: usize,
}

impl ScanSummary {
    fn record(&mut self, path: &Path, result: Result<anyhow::Result<()>, JoinError>) {
        match result {
            Ok(Ok(())) => self.succeeded += 1,
            Ok(Err(err)) => {
                self.failed += 1;
                error!(file = %path.display(), error = %format_args!("{err:#}"), "file processing failed");
            }
            Err(err) => {
                self.failed += 1;
                error!(file = %path.display(), error = %err, "file task did not complete");
            }
        }
    }
}

/// Runs one scan over an input root.
pub struct ScanCoordinator {
    context: Arc<SessionContext>,
    input_root: PathBuf,
    concurrency: usize,
}

impl ScanCoordinator {
    /// Coordinator running at most `concurrency` regular files at once.
    #[must_use]
    pub fn new(context: Arc<SessionContext>, input_root: PathBuf, concurrency: usize) -> Self {
        Self {
            context,
            input_root,
            concurrency: concurrency.max(1),
        }
    }

    /// Discover, scan and prune.
    ///
    /// # Errors
    ///
    /// Returns an error only when the input root cannot be traversed.
    pub async fn run(&self) -> AppResult<ScanSummary> {
        let root = self.input_root.clone();
        let discovery = tokio::task::spawn_blocking(move || discover_files(&root))
            .await
            .map_err(|source| AppError::Join {
                operation: "discover",
                source,
            })?
            .map_err(|err| AppError::fsops("discover", err))?;

        let mut summary = ScanSummary {
            discovered: discovery.len(),
            archives: discovery.archives.len(),
            ..ScanSummary::default()
        };
        info!(
            files = summary.discovered,
            archives = summary.archives,
            concurrency = self.concurrency,
            "files discovered"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let handles: Vec<(PathBuf, JoinHandle<anyhow::Result<()>>)> = discovery
            .regular
            .into_iter()
            .map(|task| {
                let path = task.full_path().to_path_buf();
                let semaphore = Arc::clone(&semaphore);
                let context = Arc::clone(&self.context);
                let span = file_span(&path);
                let handle = tokio::spawn(
                    async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .context("worker pool closed")?;
                        run_session(context, task).await
                    }
                    .instrument(span),
                );
                (path, handle)
            })
            .collect();

        for (path, handle) in handles {
            summary.record(&path, handle.await);
        }

        if !discovery.archives.is_empty() {
            info!(archives = discovery.archives.len(), "processing archives sequentially");
        }
        for task in discovery.archives {
            let path = task.full_path().to_path_buf();
            let span = file_span(&path);
            let result =
                tokio::spawn(run_session(Arc::clone(&self.context), task).instrument(span)).await;
            summary.record(&path, result);
        }

        self.prune().await;

        info!(
            discovered = summary.discovered,
            archives = summary.archives,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "scan finished"
        );
        Ok(summary)
    }

    async fn prune(&self) {
        let root = self.input_root.clone();
        match tokio::task::spawn_blocking(move || prune_empty_directories(&root)).await {
            Ok(Ok(removed)) => info!(removed, "empty input directories pruned"),
            Ok(Err(err)) => warn!(error = %format_args!("{:#}", anyhow::Error::new(err)), "pruning input directories failed"),
            Err(err) => warn!(error = %err, "pruning task did not complete"),
        }
    }
}

async fn run_session(context: Arc<SessionContext>, task: FileTask) -> anyhow::Result<()> {
    let mut session = VerdictSession::new(context, task);
    session.handle().await?;
    Ok(())
}
