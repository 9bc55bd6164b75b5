//! Directory preflight and cleanup.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::classify::PathClassifier;
use crate::error::{FsOpsError, FsOpsResult};

/// Whether a missing directory should be created during preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryMode {
    /// The directory must already exist.
    MustExist,
    /// Create the directory (and ancestors) when missing.
    CreateIfMissing,
}

/// How a directory became usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryStatus {
    /// The directory existed and could be listed.
    Accessible,
    /// The directory was created.
    Created,
}

/// Retry settings for directory preflight on flaky storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreflightPolicy {
    /// Attempts before giving up on a network path.
    pub attempts: u32,
    /// First wait on network paths; doubles after each failure.
    pub network_base: Duration,
}

impl Default for PreflightPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            network_base: Duration::from_secs(2),
        }
    }
}

/// Check that `path` is a usable directory, creating it when allowed.
///
/// OS errors on network paths are retried with doubling backoff. Permission
/// errors fail immediately.
///
/// # Errors
///
/// Returns [`FsOpsError::DirectoryUnavailable`] when the directory is missing
/// (and may not be created), is not a directory, or cannot be accessed.
pub fn ensure_directory(
    path: &Path,
    mode: DirectoryMode,
    classifier: &PathClassifier,
    policy: &PreflightPolicy,
) -> FsOpsResult<DirectoryStatus> {
    let network = classifier.is_network_path(path);
    let attempts = policy.attempts.max(1);
    let mut wait = policy.network_base;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match probe_directory(path, mode) {
            Ok(status) => return Ok(status),
            Err(ProbeError::Fatal(reason)) => {
                return Err(FsOpsError::DirectoryUnavailable {
                    path: path.to_path_buf(),
                    reason,
                    attempts: attempt,
                    source: None,
                });
            }
            Err(ProbeError::Io(err)) => {
                let retryable = err.kind() != io::ErrorKind::PermissionDenied && network;
                if !retryable || attempt >= attempts {
                    let reason = if err.kind() == io::ErrorKind::PermissionDenied {
                        "permission_denied"
                    } else {
                        "os_error"
                    };
                    return Err(FsOpsError::DirectoryUnavailable {
                        path: path.to_path_buf(),
                        reason,
                        attempts: attempt,
                        source: Some(err),
                    });
                }
                warn!(path = %path.display(), attempt, error = %err, "directory check failed; retrying");
                thread::sleep(wait);
                wait = wait.saturating_mul(2);
            }
        }
    }
}

enum ProbeError {
    Fatal(&'static str),
    Io(io::Error),
}

fn probe_directory(path: &Path, mode: DirectoryMode) -> Result<DirectoryStatus, ProbeError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::read_dir(path).map_err(ProbeError::Io)?;
            Ok(DirectoryStatus::Accessible)
        }
        Ok(_) => Err(ProbeError::Fatal("not_a_directory")),
        Err(err) if err.kind() == io::ErrorKind::NotFound => match mode {
            DirectoryMode::MustExist => Err(ProbeError::Fatal("missing")),
            DirectoryMode::CreateIfMissing => {
                fs::create_dir_all(path).map_err(ProbeError::Io)?;
                Ok(DirectoryStatus::Created)
            }
        },
        Err(err) => Err(ProbeError::Io(err)),
    }
}

/// Remove every empty directory below `root`, deepest first. `root` itself is kept.
///
/// Removal failures are logged and skipped. Returns the number of directories removed.
///
/// # Errors
///
/// Returns an error only if `root` cannot be traversed at all.
pub fn prune_empty_directories(root: &Path) -> FsOpsResult<usize> {
    fs::metadata(root).map_err(|err| FsOpsError::io("prune.stat_root", root, err))?;

    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry while pruning");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        let empty = fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            continue;
        }
        match fs::remove_dir(dir) {
            Ok(()) => {
                removed += 1;
                info!(path = %dir.display(), "deleted empty directory");
            }
            Err(err) => warn!(path = %dir.display(), error = %err, "failed to delete empty directory"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn quick_policy() -> PreflightPolicy {
        PreflightPolicy {
            attempts: 2,
            network_base: Duration::ZERO,
        }
    }

    #[test]
    fn existing_directory_is_accessible() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let status = ensure_directory(
            temp.path(),
            DirectoryMode::MustExist,
            &PathClassifier::default(),
            &quick_policy(),
        )?;
        assert_eq!(status, DirectoryStatus::Accessible);
        Ok(())
    }

    #[test]
    fn missing_directory_is_created_when_allowed() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("a").join("b");
        let status = ensure_directory(
            &target,
            DirectoryMode::CreateIfMissing,
            &PathClassifier::default(),
            &quick_policy(),
        )?;
        assert_eq!(status, DirectoryStatus::Created);
        assert!(target.is_dir());
        Ok(())
    }

    #[test]
    fn missing_directory_fails_when_it_must_exist() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = ensure_directory(
            &temp.path().join("absent"),
            DirectoryMode::MustExist,
            &PathClassifier::default(),
            &quick_policy(),
        )
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected missing directory error"))?;
        assert!(matches!(
            err,
            FsOpsError::DirectoryUnavailable {
                reason: "missing",
                attempts: 1,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn file_in_place_of_directory_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("file.txt");
        fs::write(&file, b"x")?;
        let err = ensure_directory(
            &file,
            DirectoryMode::CreateIfMissing,
            &PathClassifier::default(),
            &quick_policy(),
        );
        assert!(matches!(
            err,
            Err(FsOpsError::DirectoryUnavailable {
                reason: "not_a_directory",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn local_os_error_fails_without_retry() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("file.txt");
        fs::write(&file, b"x")?;
        let err = ensure_directory(
            &file.join("child"),
            DirectoryMode::CreateIfMissing,
            &PathClassifier::default(),
            &quick_policy(),
        );
        assert!(matches!(
            err,
            Err(FsOpsError::DirectoryUnavailable {
                reason: "os_error",
                attempts: 1,
                ..
            })
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn network_os_error_is_retried_up_to_the_limit() -> Result<()> {
        use std::ffi::OsString;
        use std::path::PathBuf;

        let temp = tempfile::tempdir()?;
        let file = temp.path().join("file.txt");
        fs::write(&file, b"x")?;
        let mut unc = OsString::from("/");
        unc.push(file.join("child"));
        let err = ensure_directory(
            &PathBuf::from(unc),
            DirectoryMode::CreateIfMissing,
            &PathClassifier::default(),
            &quick_policy(),
        );
        assert!(matches!(
            err,
            Err(FsOpsError::DirectoryUnavailable {
                reason: "os_error",
                attempts: 2,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn prune_removes_nested_empty_directories_only() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::create_dir_all(root.join("empty").join("deeper"))?;
        fs::create_dir_all(root.join("kept"))?;
        fs::write(root.join("kept").join("file.txt"), b"x")?;

        let removed = prune_empty_directories(root)?;

        assert_eq!(removed, 2);
        assert!(!root.join("empty").exists());
        assert!(root.join("kept").join("file.txt").exists());
        assert!(root.exists());
        Ok(())
    }

    #[test]
    fn prune_of_missing_root_is_an_error() {
        let result = prune_empty_directories(Path::new("/definitely/missing/root"));
        assert!(matches!(result, Err(FsOpsError::Io { .. })));
    }
}
