//! Per-file verdict session.
//!
//! # Design
//!
//! - One session owns one [`FileTask`] from hashing to final placement.
//! - The cache is consulted first; only a miss uploads the file.
//! - Polling is bounded by a retry counter so a stalled appliance cannot hang the run.
//! - Failures are routed through [`FailureKind::policy`]; only transport errors
//!   reach the coordinator.
//! - Blocking filesystem work (hashing, moves) runs on the blocking pool.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use tescan_appliance::{
    Appliance, ApplianceReply, ApplianceResponse, Feature, FeatureRequest, FileUpload,
    StatusLabel, Verdict,
};
use tescan_config::ScannerConfig;
use tescan_fsops::{DEFAULT_MOVE_ATTEMPTS, FileTask, FilenameCodec, SafeRelocator, sha1_file};
use tracing::{debug, info, warn};

use crate::error::{FailureKind, FailurePolicy, SessionError, SessionResult};

const RESPONSE_SUFFIX: &str = ".response.txt";
const REPORT_SUFFIX: &str = ".report.tar.gz";

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, nothing sent yet.
    Init,
    /// Cache lookup answered.
    CacheChecked,
    /// Upload in flight.
    Uploading,
    /// Upload failed in transit.
    UploadFailed,
    /// Appliance accepted the upload.
    UploadSuccess,
    /// Waiting for the verdict.
    Polling,
    /// Poll loop finished.
    PollDone,
    /// Final response chosen and recorded.
    Done,
    /// File moved to its terminal directory.
    Relocated,
}

impl Phase {
    /// Stable label for structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CacheChecked => "cache_checked",
            Self::Uploading => "uploading",
            Self::UploadFailed => "upload_failed",
            Self::UploadSuccess => "upload_success",
            Self::Polling => "polling",
            Self::PollDone => "poll_done",
            Self::Done => "done",
            Self::Relocated => "relocated",
        }
    }
}

/// Terminal directory a file can be moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Files judged benign.
    Benign,
    /// Files judged malicious.
    Quarantine,
    /// Files the appliance could not judge, or that failed to upload.
    Error,
}

impl Destination {
    /// Stable label for structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Benign => "benign",
            Self::Quarantine => "quarantine",
            Self::Error => "error",
        }
    }
}

/// Output roots a session writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    /// Root for response and report artifacts.
    pub reports: PathBuf,
    /// Root for benign files.
    pub benign: PathBuf,
    /// Root for malicious files.
    pub quarantine: PathBuf,
    /// Root for files that errored.
    pub error: PathBuf,
}

impl Destinations {
    /// Roots taken from the merged configuration.
    #[must_use]
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            reports: config.reports_directory.clone(),
            benign: config.benign_directory.clone(),
            quarantine: config.quarantine_directory.clone(),
            error: config.error_directory.clone(),
        }
    }

    /// Root for a relocation target.
    #[must_use]
    pub fn root(&self, destination: Destination) -> &Path {
        match destination {
            Destination::Benign => &self.benign,
            Destination::Quarantine => &self.quarantine,
            Destination::Error => &self.error,
        }
    }
}

/// Poll cadence and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before each status query.
    pub interval: Duration,
    /// Status queries made before giving up.
    pub max_retries: u32,
}

impl PollPolicy {
    /// Policy taken from the merged configuration.
    #[must_use]
    pub const fn from_config(config: &ScannerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_retries: config.max_retries,
        }
    }
}

/// Collaborators shared by every session of a run.
pub struct SessionContext {
    appliance: Arc<dyn Appliance>,
    codec: Arc<FilenameCodec>,
    destinations: Destinations,
    polling: PollPolicy,
    relocator: SafeRelocator,
}

impl SessionContext {
    /// Context with the default relocator.
    #[must_use]
    pub fn new(
        appliance: Arc<dyn Appliance>,
        codec: Arc<FilenameCodec>,
        destinations: Destinations,
        polling: PollPolicy,
    ) -> Self {
        Self {
            appliance,
            codec,
            destinations,
            polling,
            relocator: SafeRelocator::default(),
        }
    }

    /// Replace the relocator, typically to shorten backoff.
    #[must_use]
    pub fn with_relocator(mut self, relocator: SafeRelocator) -> Self {
        self.relocator = relocator;
        self
    }

    /// Output roots.
    #[must_use]
    pub const fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    /// Shared filename codec.
    #[must_use]
    pub fn codec(&self) -> &FilenameCodec {
        &self.codec
    }
}

/// Drives one file through cache check, upload, polling, reporting and relocation.
pub struct VerdictSession {
    context: Arc<SessionContext>,
    task: FileTask,
    phase: Phase,
    sha1: Option<String>,
    last_response: Option<ApplianceReply>,
    verdict: Verdict,
    early_verdict: Option<Verdict>,
    report_id: Option<String>,
}

impl VerdictSession {
    /// Session for `task` in state [`Phase::Init`].
    #[must_use]
    pub const fn new(context: Arc<SessionContext>, task: FileTask) -> Self {
        Self {
            context,
            task,
            phase: Phase::Init,
            sha1: None,
            last_response: None,
            verdict: Verdict::Unknown,
            early_verdict: None,
            report_id: None,
        }
    }

    /// File being handled.
    #[must_use]
    pub const fn task(&self) -> &FileTask {
        &self.task
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Content hash, once computed.
    #[must_use]
    pub fn sha1(&self) -> Option<&str> {
        self.sha1.as_deref()
    }

    /// Verdict that decided placement; `Unknown` until a conclusive result arrives.
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Provisional verdict from the fast-path feature, if one was seen while polling.
    #[must_use]
    pub const fn early_verdict(&self) -> Option<Verdict> {
        self.early_verdict
    }

    /// Summary report identifier for malicious files.
    #[must_use]
    pub fn report_id(&self) -> Option<&str> {
        self.report_id.as_deref()
    }

    /// Most recent appliance reply.
    #[must_use]
    pub const fn last_response(&self) -> Option<&ApplianceReply> {
        self.last_response.as_ref()
    }

    /// Run the whole lifecycle.
    ///
    /// Outcomes are visible through the filesystem and logs. Upload, relocation
    /// and report failures are absorbed here.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be hashed, a query fails in
    /// transit, or the response artifact cannot be written.
    pub async fn handle(&mut self) -> SessionResult<()> {
        let sha1 = self.compute_sha1().await?;
        debug!(sha1 = %sha1, "content hash computed");

        let cached = match self
            .context
            .appliance
            .query(&FeatureRequest::cache_query(&sha1))
            .await
        {
            Ok(reply) => reply,
            Err(source) => {
                return self
                    .apply_policy(
                        FailureKind::Transport,
                        SessionError::appliance("cache_query", source),
                    )
                    .await;
            }
        };
        self.last_response = Some(cached.clone());
        self.set_phase(Phase::CacheChecked);

        let final_reply = if cached.parsed.status == StatusLabel::Found {
            info!("results already present in appliance cache");
            cached
        } else {
            info!(status = %cached.parsed.status, "no cached results; uploading");
            match self.upload(&sha1).await? {
                Some(reply) => reply,
                None => return Ok(()),
            }
        };

        self.finish(final_reply).await
    }

    async fn compute_sha1(&mut self) -> SessionResult<String> {
        let path = self.task.full_path().to_path_buf();
        let hashed = path.clone();
        let sha1 = tokio::task::spawn_blocking(move || sha1_file(&hashed))
            .await
            .map_err(|source| SessionError::join("sha1", source))?
            .map_err(|source| SessionError::Hash { path, source })?;
        self.sha1 = Some(sha1.clone());
        Ok(sha1)
    }

    /// Upload and, on acceptance, poll. `None` means the file was redirected.
    async fn upload(&mut self, sha1: &str) -> SessionResult<Option<ApplianceReply>> {
        self.set_phase(Phase::Uploading);
        let upload = FileUpload {
            path: self.task.full_path().to_path_buf(),
            wire_name: self.context.codec.encode(self.task.file_name()),
        };
        debug!(wire_name = %upload.wire_name, "uploading file");

        let reply = match self
            .context
            .appliance
            .upload(&FeatureRequest::upload(), &upload)
            .await
        {
            Ok(reply) => reply,
            Err(source) => {
                self.set_phase(Phase::UploadFailed);
                self.apply_policy(FailureKind::Upload, SessionError::appliance("upload", source))
                    .await?;
                return Ok(None);
            }
        };
        self.last_response = Some(reply.clone());
        self.log_upload_ack(&reply.parsed);

        if reply.parsed.status == StatusLabel::UploadSuccess {
            self.set_phase(Phase::UploadSuccess);
            self.poll(sha1, reply).await.map(Some)
        } else {
            info!(status = %reply.parsed.status, "upload not accepted; using upload response as final");
            Ok(Some(reply))
        }
    }

    fn log_upload_ack(&self, response: &ApplianceResponse) {
        let Some(echoed) = response.file_name.as_deref() else {
            return;
        };
        match self.context.codec.decode(echoed) {
            Some(original) => debug!(
                wire_name = echoed,
                original = %original.to_string_lossy(),
                status = %response.status,
                "upload acknowledged"
            ),
            None => debug!(wire_name = echoed, status = %response.status, "upload acknowledged under an unknown name"),
        }
    }

    async fn poll(&mut self, sha1: &str, accepted: ApplianceReply) -> SessionResult<ApplianceReply> {
        self.set_phase(Phase::Polling);
        let PollPolicy {
            interval,
            max_retries,
        } = self.context.polling;
        let request = FeatureRequest::poll_query(sha1);
        let mut last = accepted;
        let mut retry = 0_u32;

        tokio::time::sleep(interval).await;
        loop {
            let reply = match self.context.appliance.query(&request).await {
                Ok(reply) => reply,
                Err(source) => {
                    self.apply_policy(FailureKind::Transport, SessionError::appliance("poll", source))
                        .await?;
                    break;
                }
            };
            self.last_response = Some(reply.clone());
            let status = reply.parsed.status.clone();
            debug!(status = %status, retry, "status query answered");

            let settled = !status.is_in_progress()
                || (status == StatusLabel::PartiallyFound
                    && self.partial_result_settled(&reply.parsed));
            last = reply;
            if settled {
                break;
            }

            retry += 1;
            if retry >= max_retries {
                warn!(max_retries, status = %status, "poll limit reached; using last response");
                break;
            }
            tokio::time::sleep(interval).await;
        }

        info!(status = %last.parsed.status, "status query finished");
        self.set_phase(Phase::PollDone);
        Ok(last)
    }

    /// Inspect a `PARTIALLY_FOUND` reply. Returns `true` once the primary feature is settled.
    fn partial_result_settled(&mut self, response: &ApplianceResponse) -> bool {
        if let Some(eb) = response.feature(Feature::TeEb) {
            if eb.status == StatusLabel::Found && self.early_verdict.is_none() {
                info!(verdict = %eb.verdict, "early verdict from te_eb");
                self.early_verdict = Some(eb.verdict);
            }
        }

        let Some(te) = response.feature(Feature::Te) else {
            return false;
        };
        match te.status {
            StatusLabel::Found | StatusLabel::NotFound => true,
            StatusLabel::PartiallyFound => te.pending_images == 0,
            _ => false,
        }
    }

    async fn finish(&mut self, reply: ApplianceReply) -> SessionResult<()> {
        self.last_response = Some(reply.clone());
        self.set_phase(Phase::Done);
        self.write_response(&reply.raw).await?;

        if reply.parsed.status != StatusLabel::Found {
            info!(status = %reply.parsed.status, "no conclusive verdict; file left in place");
            return Ok(());
        }

        let te = reply.parsed.feature(Feature::Te);
        self.verdict = te.map_or(Verdict::Unknown, |te| te.verdict);
        info!(verdict = %self.verdict, "te verdict");

        match self.verdict {
            Verdict::Malicious => {
                self.move_or_log(Destination::Quarantine).await?;
                self.report_id = te
                    .and_then(|te| te.summary_report.clone())
                    .filter(|id| !id.is_empty());
                self.fetch_report().await
            }
            Verdict::Benign => self.move_or_log(Destination::Benign).await,
            Verdict::Error => self.move_or_log(Destination::Error).await,
            Verdict::Unknown => {
                info!("verdict not actionable; file left in place");
                Ok(())
            }
        }
    }

    async fn fetch_report(&mut self) -> SessionResult<()> {
        let Some(report_id) = self.report_id.clone() else {
            warn!("malicious verdict without a summary report id");
            return Ok(());
        };
        match self.download_report(&report_id).await {
            Ok(path) => {
                info!(report_id = %report_id, path = %path.display(), "report downloaded");
                Ok(())
            }
            Err(error) => self.apply_policy(FailureKind::ReportFetch, error).await,
        }
    }

    async fn download_report(&self, report_id: &str) -> SessionResult<PathBuf> {
        debug!(report_id, "requesting report");
        let bytes = self
            .context
            .appliance
            .download(report_id)
            .await
            .map_err(|source| SessionError::appliance("download", source))?;
        let path = self.artifact_path(REPORT_SUFFIX);
        write_artifact("report.write", &path, &bytes).await?;
        Ok(path)
    }

    async fn write_response(&self, raw: &Value) -> SessionResult<()> {
        let path = self.artifact_path(RESPONSE_SUFFIX);
        let rendered = render_response(raw).map_err(|err| SessionError::Artifact {
            operation: "response.render",
            path: path.clone(),
            source: io::Error::other(err),
        })?;
        write_artifact("response.write", &path, &rendered).await?;
        debug!(path = %path.display(), "response artifact written");
        Ok(())
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.task
            .mirrored_dir(&self.context.destinations.reports)
            .join(artifact_name(self.task.file_name(), suffix))
    }

    async fn move_or_log(&mut self, destination: Destination) -> SessionResult<()> {
        match self.relocate(destination).await {
            Ok(()) => Ok(()),
            Err(error) => self.apply_policy(FailureKind::Relocation, error).await,
        }
    }

    async fn relocate(&mut self, destination: Destination) -> SessionResult<()> {
        let target = self
            .task
            .mirrored_in(self.context.destinations.root(destination));
        let relocator = self.context.relocator.clone();
        let src = self.task.full_path().to_path_buf();
        let dst = target.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            relocator.relocate(&src, &dst, None, DEFAULT_MOVE_ATTEMPTS)
        })
        .await
        .map_err(|source| SessionError::join("relocate", source))?;

        if outcome.success {
            info!(
                destination = destination.as_str(),
                path = %target.display(),
                checksum_verified = ?outcome.checksum_verified,
                "file relocated"
            );
            self.set_phase(Phase::Relocated);
            Ok(())
        } else {
            Err(SessionError::Relocation {
                destination: target,
                message: outcome.message,
            })
        }
    }

    async fn apply_policy(&mut self, kind: FailureKind, error: SessionError) -> SessionResult<()> {
        match kind.policy() {
            FailurePolicy::Propagate => Err(error),
            FailurePolicy::RedirectToError => {
                let error = anyhow::Error::new(error);
                warn!(kind = kind.as_str(), error = %format_args!("{error:#}"), "moving file to error directory");
                if let Err(move_error) = self.relocate(Destination::Error).await {
                    let move_error = anyhow::Error::new(move_error);
                    warn!(
                        kind = FailureKind::Relocation.as_str(),
                        error = %format_args!("{move_error:#}"),
                        "file could not be moved to error directory"
                    );
                }
                Ok(())
            }
            FailurePolicy::LogOnly => {
                let error = anyhow::Error::new(error);
                warn!(kind = kind.as_str(), error = %format_args!("{error:#}"), "session step failed");
                Ok(())
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = self.phase.as_str(), to = phase.as_str(), "session phase changed");
        self.phase = phase;
    }
}

fn artifact_name(file_name: &OsStr, suffix: &str) -> OsString {
    let mut name = file_name.to_os_string();
    name.push(suffix);
    name
}

/// JSON with four-space indentation.
fn render_response(raw: &Value) -> serde_json::Result<Vec<u8>> {
    let mut rendered = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut rendered, PrettyFormatter::with_indent(b"    "));
    raw.serialize(&mut serializer)?;
    Ok(rendered)
}

async fn write_artifact(operation: &'static str, path: &Path, bytes: &[u8]) -> SessionResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| SessionError::Artifact {
                operation,
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| SessionError::Artifact {
            operation,
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tescan_appliance::ApplianceError;
    use tescan_fsops::{BackoffPolicy, PathClassifier};
    use tescan_test_support::fixtures::ScanTree;
    use tescan_test_support::mocks::{
        ScriptedAppliance, partial_reply, status_reply, upload_reply, verdict_reply,
    };

    fn context(tree: &ScanTree, appliance: &Arc<ScriptedAppliance>, max_retries: u32) -> Arc<SessionContext> {
        let destinations = Destinations {
            reports: tree.reports(),
            benign: tree.benign(),
            quarantine: tree.quarantine(),
            error: tree.error(),
        };
        let polling = PollPolicy {
            interval: Duration::from_millis(1),
            max_retries,
        };
        let appliance: Arc<dyn Appliance> = appliance.clone();
        Arc::new(
            SessionContext::new(appliance, Arc::new(FilenameCodec::new()), destinations, polling)
                .with_relocator(SafeRelocator::new(
                    PathClassifier::default(),
                    BackoffPolicy::immediate(),
                )),
        )
    }

    fn session_for(tree: &ScanTree, relative: &str, context: Arc<SessionContext>) -> Result<VerdictSession> {
        let path = tree.write_input(relative, b"sample payload")?;
        let relative = Path::new(relative);
        let task = FileTask::new(
            relative.file_name().unwrap_or_default(),
            relative.parent().unwrap_or(Path::new("")),
            path,
        );
        Ok(VerdictSession::new(context, task))
    }

    fn transport_error() -> ApplianceError {
        ApplianceError::Status {
            operation: "upload",
            status: 502,
            body: "bad gateway".to_string(),
        }
    }

    #[tokio::test]
    async fn cache_hit_never_uploads() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(ScriptedAppliance::new().then_query(verdict_reply("Benign", None)));
        let mut session = session_for(&tree, "docs/letter.docx", context(&tree, &fake, 3))?;

        session.handle().await?;

        assert_eq!(fake.upload_count(), 0);
        assert_eq!(fake.query_count(), 1);
        assert_eq!(session.verdict(), Verdict::Benign);
        assert_eq!(session.phase(), Phase::Relocated);
        assert!(tree.benign().join("docs/letter.docx").is_file());
        assert!(tree.reports().join("docs/letter.docx.response.txt").is_file());
        assert!(session.sha1().is_some_and(|sha1| sha1.len() == 40));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_upload_is_final_without_polling() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(
            ScriptedAppliance::new()
                .then_query(status_reply("NOT_FOUND"))
                .then_upload(upload_reply("UPLOAD_FAILURE", "a.bin")),
        );
        let mut session = session_for(&tree, "a.bin", context(&tree, &fake, 3))?;

        session.handle().await?;

        assert_eq!(fake.query_count(), 1);
        assert_eq!(fake.upload_count(), 1);
        assert_eq!(session.phase(), Phase::Done);
        assert!(tree.input().join("a.bin").is_file());
        let artifact = std::fs::read_to_string(tree.reports().join("a.bin.response.txt"))?;
        assert!(artifact.contains("UPLOAD_FAILURE"));
        assert!(artifact.contains("\n    \"response\""));
        Ok(())
    }

    #[tokio::test]
    async fn poll_limit_stops_without_error() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(
            ScriptedAppliance::new()
                .then_query(status_reply("NOT_FOUND"))
                .then_upload(upload_reply("UPLOAD_SUCCESS", "slow.exe"))
                .then_query_repeated(&status_reply("PENDING"), 3),
        );
        let mut session = session_for(&tree, "slow.exe", context(&tree, &fake, 3))?;

        session.handle().await?;

        assert_eq!(fake.query_count(), 4);
        assert_eq!(session.verdict(), Verdict::Unknown);
        assert_eq!(
            session.last_response().map(|reply| reply.parsed.status.clone()),
            Some(StatusLabel::Pending)
        );
        assert!(tree.input().join("slow.exe").is_file());
        assert!(tree.reports().join("slow.exe.response.txt").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn upload_transport_failure_redirects_to_error() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(
            ScriptedAppliance::new()
                .then_query(status_reply("NOT_FOUND"))
                .then_upload_error(transport_error()),
        );
        let mut session = session_for(&tree, "nested/broken.zip", context(&tree, &fake, 3))?;

        session.handle().await?;

        assert_eq!(session.phase(), Phase::Relocated);
        assert!(tree.error().join("nested/broken.zip").is_file());
        assert!(!tree.input().join("nested/broken.zip").exists());
        assert!(!tree.reports().join("nested/broken.zip.response.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn settled_partial_result_stops_polling_early() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(
            ScriptedAppliance::new()
                .then_query(status_reply("NOT_FOUND"))
                .then_upload(upload_reply("UPLOAD_SUCCESS", "x.pdf"))
                .then_query(partial_reply("PARTIALLY_FOUND", None, &["found", "pending"], Some("Malicious")))
                .then_query(partial_reply("PARTIALLY_FOUND", None, &["found", "found"], Some("Malicious")))
                .then_query(verdict_reply("Malicious", Some("never-read"))),
        );
        let mut session = session_for(&tree, "x.pdf", context(&tree, &fake, 10))?;

        session.handle().await?;

        assert_eq!(fake.query_count(), 3);
        assert_eq!(session.early_verdict(), Some(Verdict::Malicious));
        assert_eq!(session.verdict(), Verdict::Unknown);
        assert_eq!(session.phase(), Phase::Done);
        assert!(tree.input().join("x.pdf").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn primary_not_found_inside_partial_result_stops_polling() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(
            ScriptedAppliance::new()
                .then_query(status_reply("NOT_FOUND"))
                .then_upload(upload_reply("UPLOAD_SUCCESS", "y.doc"))
                .then_query(partial_reply("NOT_FOUND", None, &[], None))
                .then_query(verdict_reply("Benign", None)),
        );
        let mut session = session_for(&tree, "y.doc", context(&tree, &fake, 10))?;

        session.handle().await?;

        assert_eq!(fake.query_count(), 2);
        assert_eq!(session.early_verdict(), None);
        assert_eq!(
            session.last_response().map(|reply| reply.parsed.status.clone()),
            Some(StatusLabel::PartiallyFound)
        );
        assert_eq!(session.phase(), Phase::Done);
        assert!(tree.input().join("y.doc").is_file());
        assert!(tree.reports().join("y.doc.response.txt").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn error_verdict_moves_file_to_error_root() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(ScriptedAppliance::new().then_query(verdict_reply("Error", None)));
        let mut session = session_for(&tree, "batch/odd.bin", context(&tree, &fake, 3))?;

        session.handle().await?;

        assert_eq!(session.verdict(), Verdict::Error);
        assert_eq!(session.phase(), Phase::Relocated);
        assert!(tree.error().join("batch/odd.bin").is_file());
        assert!(!tree.input().join("batch/odd.bin").exists());
        assert!(tree.reports().join("batch/odd.bin.response.txt").is_file());
        assert_eq!(fake.download_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn report_failure_does_not_undo_quarantine() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(
            ScriptedAppliance::new()
                .then_query(verdict_reply("Malicious", Some("r-9")))
                .then_download_error(transport_error()),
        );
        let mut session = session_for(&tree, "evil.js", context(&tree, &fake, 3))?;

        session.handle().await?;

        assert_eq!(fake.download_count(), 1);
        assert_eq!(session.report_id(), Some("r-9"));
        assert!(tree.quarantine().join("evil.js").is_file());
        assert!(!tree.reports().join("evil.js.report.tar.gz").exists());
        Ok(())
    }

    #[tokio::test]
    async fn cache_query_failure_propagates() -> Result<()> {
        let tree = ScanTree::new()?;
        let fake = Arc::new(ScriptedAppliance::new().then_query_error(transport_error()));
        let mut session = session_for(&tree, "q.txt", context(&tree, &fake, 3))?;

        let result = session.handle().await;

        assert!(matches!(
            result,
            Err(SessionError::Appliance {
                operation: "cache_query",
                ..
            })
        ));
        assert_eq!(session.phase(), Phase::Init);
        assert!(tree.input().join("q.txt").is_file());
        Ok(())
    }

    #[test]
    fn response_rendering_uses_four_space_indent() -> Result<()> {
        let rendered = render_response(&serde_json::json!({"a": {"b": 1}}))?;
        assert_eq!(String::from_utf8(rendered)?, "{\n    \"a\": {\n        \"b\": 1\n    }\n}");
        Ok(())
    }
}
