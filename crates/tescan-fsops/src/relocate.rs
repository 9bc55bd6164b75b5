//! Retryable, checksum-verified file relocation.
//!
//! # Design
//! - Source checksum and destination parent creation happen once, before the retry loop.
//! - The move itself goes through a [`Transfer`] so a same-volume rename can fall
//!   back to copy + delete across volumes (and tests can simulate either).
//! - Locked files and generic OS errors back off and retry; a vanished source is fatal.
//! - A verified move either matches checksums or leaves nothing at the destination.
//! - A failed move never leaves a copy behind while the source survives.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::checksum::sha1_file;
use crate::classify::PathClassifier;

/// Default number of move attempts.
pub const DEFAULT_MOVE_ATTEMPTS: u32 = 3;

/// Strategy used to place a file at its destination.
pub trait Transfer: Send + Sync {
    /// Move `src` to `dst`. The destination's parent already exists.
    ///
    /// # Errors
    ///
    /// Returns the IO error that prevented the move.
    fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// Rename when possible, otherwise copy and delete the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOrCopy;

impl Transfer for RenameOrCopy {
    fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()> {
        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(rename_err) if rename_err.kind() == io::ErrorKind::NotFound => Err(rename_err),
            Err(rename_err) => {
                debug!(
                    src = %src.display(),
                    dst = %dst.display(),
                    error = %rename_err,
                    "rename failed; falling back to copy and delete"
                );
                copy_then_remove(src, dst)
            }
        }
    }
}

/// Copy `src` to `dst` and remove `src`, the cross-volume form of a move.
///
/// # Errors
///
/// Returns the copy error, or the removal error if the source could not be
/// deleted. In the latter case the copy at `dst` is removed again.
pub fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    if let Err(err) = fs::remove_file(src) {
        discard_partial(dst);
        return Err(err);
    }
    Ok(())
}

fn discard_partial(dst: &Path) {
    if let Err(err) = fs::remove_file(dst) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(dst = %dst.display(), error = %err, "failed to remove partial destination");
        }
    }
}

/// Backoff bases chosen by path classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First wait when both endpoints are local.
    pub local_base: Duration,
    /// First wait when either endpoint is on network storage.
    pub network_base: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            local_base: Duration::from_secs(1),
            network_base: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// No waiting between attempts.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            local_base: Duration::ZERO,
            network_base: Duration::ZERO,
        }
    }

    /// Base interval for the given classification.
    #[must_use]
    pub const fn base(&self, network: bool) -> Duration {
        if network {
            self.network_base
        } else {
            self.local_base
        }
    }
}

/// Result of a relocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationOutcome {
    /// Whether the file now lives at the destination.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Checksum comparison result when verification ran.
    pub checksum_verified: Option<bool>,
}

impl RelocationOutcome {
    fn moved(message: String, checksum_verified: Option<bool>) -> Self {
        Self {
            success: true,
            message,
            checksum_verified,
        }
    }

    fn failed(message: String, checksum_verified: Option<bool>) -> Self {
        Self {
            success: false,
            message,
            checksum_verified,
        }
    }
}

/// Why a single move attempt failed.
#[derive(Debug)]
pub enum MoveFailure {
    /// Permission or sharing violation, usually a file held open elsewhere.
    Locked(io::Error),
    /// The source disappeared.
    SourceMissing(io::Error),
    /// Any other OS-level failure (network timeout, disk full, ...).
    Os(io::Error),
}

impl MoveFailure {
    /// Classify an IO error raised by a move attempt.
    #[must_use]
    pub fn classify(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return Self::SourceMissing(err);
        }
        if err.kind() == io::ErrorKind::PermissionDenied || is_sharing_violation(&err) {
            return Self::Locked(err);
        }
        Self::Os(err)
    }

    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::SourceMissing(_))
    }

    fn describe(&self) -> String {
        match self {
            Self::Locked(err) => format!("permission error (file may be locked): {err}"),
            Self::SourceMissing(err) => format!("source file not found: {err}"),
            Self::Os(err) => format!("OS error: {err}"),
        }
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;
    matches!(
        err.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
const fn is_sharing_violation(_err: &io::Error) -> bool {
    false
}

/// Moves files between directories, tolerating transient locking and network errors.
#[derive(Clone)]
pub struct SafeRelocator<T: Transfer = RenameOrCopy> {
    classifier: PathClassifier,
    backoff: BackoffPolicy,
    transfer: Arc<T>,
}

impl Default for SafeRelocator {
    fn default() -> Self {
        Self::new(PathClassifier::default(), BackoffPolicy::default())
    }
}

impl SafeRelocator {
    /// Relocator using rename with a copy-and-delete fallback.
    #[must_use]
    pub fn new(classifier: PathClassifier, backoff: BackoffPolicy) -> Self {
        Self::with_transfer(classifier, backoff, RenameOrCopy)
    }
}

impl<T: Transfer> SafeRelocator<T> {
    /// Relocator with a custom transfer strategy.
    #[must_use]
    pub fn with_transfer(classifier: PathClassifier, backoff: BackoffPolicy, transfer: T) -> Self {
        Self {
            classifier,
            backoff,
            transfer: Arc::new(transfer),
        }
    }

    /// Classifier used to pick verification and backoff defaults.
    #[must_use]
    pub const fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    /// Move `src` to `dst`.
    ///
    /// `verify_checksum` defaults to `true` when either endpoint is a network
    /// path. Up to `attempts` tries are made, doubling the wait after each
    /// retryable failure.
    #[must_use]
    pub fn relocate(
        &self,
        src: &Path,
        dst: &Path,
        verify_checksum: Option<bool>,
        attempts: u32,
    ) -> RelocationOutcome {
        let network =
            self.classifier.is_network_path(src) || self.classifier.is_network_path(dst);
        let verify = verify_checksum.unwrap_or(network);

        let source_checksum = if verify {
            match sha1_file(src) {
                Ok(sum) => Some(sum),
                Err(err) => {
                    return RelocationOutcome::failed(
                        format!("failed to calculate source checksum: {err}"),
                        None,
                    );
                }
            }
        } else {
            None
        };

        if let Some(parent) = dst.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if let Err(err) = fs::create_dir_all(parent) {
                return RelocationOutcome::failed(
                    format!(
                        "failed to create destination directory {}: {err}",
                        parent.display()
                    ),
                    None,
                );
            }
        }

        let dst_preexisted = dst.exists();
        let attempts = attempts.max(1);
        let mut wait = self.backoff.base(network);
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=attempts {
            match self.transfer.transfer(src, dst) {
                Ok(()) => return Self::verify(src, dst, source_checksum.as_deref()),
                Err(err) => {
                    if !dst_preexisted && src.exists() && dst.exists() {
                        discard_partial(dst);
                    }
                    let failure = MoveFailure::classify(err);
                    if !failure.is_retryable() {
                        return RelocationOutcome::failed(failure.describe(), None);
                    }
                    last_failure = failure.describe();
                    warn!(
                        src = %src.display(),
                        dst = %dst.display(),
                        attempt,
                        attempts,
                        error = %last_failure,
                        "file move attempt failed"
                    );
                    if attempt < attempts {
                        thread::sleep(wait);
                        wait = wait.saturating_mul(2);
                    }
                }
            }
        }

        RelocationOutcome::failed(
            format!("failed to move file after {attempts} attempts: {last_failure}"),
            None,
        )
    }

    fn verify(src: &Path, dst: &Path, expected: Option<&str>) -> RelocationOutcome {
        let moved_message = || {
            let name = src.file_name().map_or_else(
                || src.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            );
            format!("successfully moved {name} to {}", dst.display())
        };

        let Some(expected) = expected else {
            return RelocationOutcome::moved(moved_message(), None);
        };

        match sha1_file(dst) {
            Ok(actual) if actual == expected => RelocationOutcome::moved(moved_message(), Some(true)),
            Ok(_) => {
                Self::discard_corrupt(dst);
                RelocationOutcome::failed(
                    "checksum mismatch after move (corruption detected)".to_string(),
                    Some(false),
                )
            }
            Err(err) => {
                Self::discard_corrupt(dst);
                RelocationOutcome::failed(
                    format!("failed to calculate destination checksum: {err}"),
                    Some(false),
                )
            }
        }
    }

    fn discard_corrupt(dst: &Path) {
        if let Err(err) = fs::remove_file(dst) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(dst = %dst.display(), error = %err, "failed to remove unverified destination");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn temp_dir() -> Result<TempDir> {
        Ok(tempfile::Builder::new().prefix("tescan-fsops-").tempdir()?)
    }

    fn relocator<T: Transfer>(transfer: T) -> SafeRelocator<T> {
        SafeRelocator::with_transfer(
            PathClassifier::default(),
            BackoffPolicy::immediate(),
            transfer,
        )
    }

    struct CopyOnly;

    impl Transfer for CopyOnly {
        fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()> {
            copy_then_remove(src, dst)
        }
    }

    struct Corrupting;

    impl Transfer for Corrupting {
        fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()> {
            RenameOrCopy.transfer(src, dst)?;
            fs::write(dst, b"tampered")
        }
    }

    struct CopyButKeepSource {
        calls: AtomicU32,
    }

    impl Transfer for CopyButKeepSource {
        fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::copy(src, dst)?;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    struct FailingThenOk {
        failures_left: AtomicU32,
        kind: io::ErrorKind,
        calls: AtomicU32,
    }

    impl FailingThenOk {
        fn new(failures: u32, kind: io::ErrorKind) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                kind,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Transfer for FailingThenOk {
        fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(io::Error::new(self.kind, "simulated"));
            }
            RenameOrCopy.transfer(src, dst)
        }
    }

    struct Recording(Mutex<Vec<bool>>);

    impl Transfer for Recording {
        fn transfer(&self, src: &Path, dst: &Path) -> io::Result<()> {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(src.exists());
            }
            RenameOrCopy.transfer(src, dst)
        }
    }

    #[test]
    fn same_volume_move_succeeds() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("in").join("doc.pdf");
        fs::create_dir_all(src.parent().unwrap_or(temp.path()))?;
        fs::write(&src, b"payload")?;
        let dst = temp.path().join("out").join("nested").join("doc.pdf");

        let outcome = SafeRelocator::new(PathClassifier::default(), BackoffPolicy::immediate())
            .relocate(&src, &dst, Some(true), DEFAULT_MOVE_ATTEMPTS);

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.checksum_verified, Some(true));
        assert!(!src.exists());
        assert_eq!(fs::read(&dst)?, b"payload");
        Ok(())
    }

    #[test]
    fn cross_volume_copy_fallback_succeeds() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("doc.bin");
        fs::write(&src, b"cross-volume")?;
        let dst = temp.path().join("other-volume").join("doc.bin");

        let outcome = relocator(CopyOnly).relocate(&src, &dst, Some(true), 1);

        assert!(outcome.success, "{}", outcome.message);
        assert!(!src.exists());
        assert_eq!(fs::read(&dst)?, b"cross-volume");
        Ok(())
    }

    #[test]
    fn tampered_destination_is_removed_and_reported() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("doc.bin");
        fs::write(&src, b"original")?;
        let dst = temp.path().join("out").join("doc.bin");

        let outcome = relocator(Corrupting).relocate(&src, &dst, Some(true), 3);

        assert!(!outcome.success);
        assert_eq!(outcome.checksum_verified, Some(false));
        assert!(outcome.message.contains("checksum mismatch"));
        assert!(!dst.exists());
        Ok(())
    }

    #[test]
    fn unverified_move_skips_checksum() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("doc.bin");
        fs::write(&src, b"original")?;
        let dst = temp.path().join("out").join("doc.bin");

        let outcome = relocator(Corrupting).relocate(&src, &dst, Some(false), 1);

        assert!(outcome.success);
        assert_eq!(outcome.checksum_verified, None);
        Ok(())
    }

    #[test]
    fn locked_file_is_retried_until_it_moves() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("locked.doc");
        fs::write(&src, b"busy")?;
        let dst = temp.path().join("out").join("locked.doc");

        let transfer = FailingThenOk::new(2, io::ErrorKind::PermissionDenied);
        let relocator = relocator(transfer);
        let outcome = relocator.relocate(&src, &dst, Some(false), 3);

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(relocator.transfer.calls.load(Ordering::SeqCst), 3);
        assert!(dst.exists());
        Ok(())
    }

    #[test]
    fn exhausted_retries_fold_last_error_into_message() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("stuck.doc");
        fs::write(&src, b"busy")?;
        let dst = temp.path().join("out").join("stuck.doc");

        let relocator = relocator(FailingThenOk::new(10, io::ErrorKind::Other));
        let outcome = relocator.relocate(&src, &dst, Some(false), 3);

        assert!(!outcome.success);
        assert!(outcome.message.contains("after 3 attempts"));
        assert!(outcome.message.contains("OS error"));
        assert_eq!(relocator.transfer.calls.load(Ordering::SeqCst), 3);
        assert!(src.exists());
        Ok(())
    }

    #[test]
    fn failed_source_removal_leaves_no_copy_behind() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("pinned.doc");
        fs::write(&src, b"still here")?;
        let dst = temp.path().join("quarantine").join("pinned.doc");

        let relocator = relocator(CopyButKeepSource {
            calls: AtomicU32::new(0),
        });
        let outcome = relocator.relocate(&src, &dst, Some(false), 3);

        assert!(!outcome.success);
        assert!(outcome.message.contains("after 3 attempts"));
        assert_eq!(relocator.transfer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fs::read(&src)?, b"still here");
        assert!(!dst.exists());
        Ok(())
    }

    #[test]
    fn default_verification_follows_classification() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("doc.bin");
        fs::write(&src, b"original")?;
        let dst = temp.path().join("out").join("doc.bin");
        let relocator = relocator(Corrupting);
        let network = relocator.classifier().is_network_path(&src)
            || relocator.classifier().is_network_path(&dst);

        let outcome = relocator.relocate(&src, &dst, None, 1);

        if network {
            assert!(!outcome.success);
            assert_eq!(outcome.checksum_verified, Some(false));
        } else {
            assert!(outcome.success, "{}", outcome.message);
            assert_eq!(outcome.checksum_verified, None);
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn network_destination_is_verified_by_default() -> Result<()> {
        use std::ffi::OsString;
        use std::path::PathBuf;

        let temp = temp_dir()?;
        let src = temp.path().join("doc.bin");
        fs::write(&src, b"original")?;
        // A doubled leading slash is UNC syntax to the classifier and the same path to POSIX.
        let mut unc = OsString::from("/");
        unc.push(temp.path().join("share").join("doc.bin"));
        let dst = PathBuf::from(unc);

        let outcome = relocator(Corrupting).relocate(&src, &dst, None, 1);

        assert!(!outcome.success);
        assert_eq!(outcome.checksum_verified, Some(false));
        assert!(!dst.exists());
        Ok(())
    }

    #[test]
    fn vanished_source_is_not_retried() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("gone.doc");
        let dst = temp.path().join("out").join("gone.doc");

        let relocator = relocator(FailingThenOk::new(5, io::ErrorKind::NotFound));
        let outcome = relocator.relocate(&src, &dst, Some(false), 3);

        assert!(!outcome.success);
        assert!(outcome.message.contains("source file not found"));
        assert_eq!(relocator.transfer.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn verification_of_missing_source_fails_before_moving() -> Result<()> {
        let temp = temp_dir()?;
        let src = temp.path().join("absent.doc");
        let dst = temp.path().join("out").join("absent.doc");
        let recording = Recording(Mutex::new(Vec::new()));

        let relocator = relocator(recording);
        let outcome = relocator.relocate(&src, &dst, Some(true), 3);

        assert!(!outcome.success);
        assert!(outcome.message.contains("source checksum"));
        let calls = relocator
            .transfer
            .0
            .lock()
            .map(|seen| seen.len())
            .unwrap_or_default();
        assert_eq!(calls, 0);
        Ok(())
    }

    #[test]
    fn move_failure_classification_matches_policy() {
        assert!(!MoveFailure::classify(io::Error::from(io::ErrorKind::NotFound)).is_retryable());
        assert!(
            MoveFailure::classify(io::Error::from(io::ErrorKind::PermissionDenied)).is_retryable()
        );
        assert!(matches!(
            MoveFailure::classify(io::Error::other("disk full")),
            MoveFailure::Os(_)
        ));
    }

    #[test]
    fn backoff_base_follows_classification() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base(true), Duration::from_secs(2));
        assert_eq!(policy.base(false), Duration::from_secs(1));
        assert_eq!(BackoffPolicy::immediate().base(true), Duration::ZERO);
    }
}
