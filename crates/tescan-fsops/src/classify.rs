//! Heuristic detection of network-backed paths.
//!
//! # Design
//! - UNC syntax is network on every platform.
//! - Elsewhere a fixed list of conventional mount roots counts as network, then an
//!   path's filesystem type is probed on a helper thread with a short timeout.
//!   Nothing touches the path on the caller's thread, so a hung mount cannot stall it.
//! - Every probe failure collapses to "not network"; callers only use the answer
//!   to tune retries and checksum verification.

use std::path::Path;
use std::time::Duration;

/// Mount roots that conventionally host SMB/CIFS/NFS shares.
pub const NETWORK_MOUNT_PREFIXES: &[&str] = &["/mnt/", "/media/", "/net/", "/smb/", "/cifs/"];

/// Default upper bound for the filesystem-type probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Classifies paths as local or network-backed.
#[derive(Debug, Clone, Copy)]
pub struct PathClassifier {
    probe_timeout: Duration,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl PathClassifier {
    /// Build a classifier whose filesystem probe gives up after `probe_timeout`.
    #[must_use]
    pub const fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Whether `path` looks like remote or mounted network storage.
    #[must_use]
    pub fn is_network_path(&self, path: &Path) -> bool {
        if is_unc_path(path) {
            return true;
        }
        if cfg!(windows) {
            return false;
        }
        if has_network_mount_prefix(path) {
            return true;
        }
        self.probe_filesystem(path)
    }

    #[cfg(target_os = "linux")]
    fn probe_filesystem(&self, path: &Path) -> bool {
        use std::sync::mpsc;
        use std::thread;

        let (sender, receiver) = mpsc::channel();
        let owned = path.to_path_buf();
        let spawned = thread::Builder::new()
            .name("tescan-fs-probe".into())
            .spawn(move || {
                let verdict = nix::sys::statfs::statfs(&owned)
                    .map(|stat| is_network_fs_type(stat.filesystem_type()));
                let _ = sender.send(verdict);
            });
        if spawned.is_err() {
            return false;
        }

        match receiver.recv_timeout(self.probe_timeout) {
            Ok(Ok(network)) => network,
            Ok(Err(err)) => {
                tracing::debug!(path = %path.display(), error = %err, "filesystem probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(path = %path.display(), "filesystem probe timed out");
                false
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    #[allow(clippy::unused_self)]
    fn probe_filesystem(&self, _path: &Path) -> bool {
        false
    }
}

/// Whether `path` uses UNC syntax (`\\server\share` or `//server/share`).
#[must_use]
pub fn is_unc_path(path: &Path) -> bool {
    let raw = path.as_os_str().as_encoded_bytes();
    raw.starts_with(b"\\\\") || raw.starts_with(b"//")
}

fn has_network_mount_prefix(path: &Path) -> bool {
    let raw = path.as_os_str().as_encoded_bytes();
    NETWORK_MOUNT_PREFIXES
        .iter()
        .any(|prefix| raw.starts_with(prefix.as_bytes()))
}

#[cfg(target_os = "linux")]
fn is_network_fs_type(fs_type: nix::sys::statfs::FsType) -> bool {
    use nix::sys::statfs::{NFS_SUPER_MAGIC, SMB_SUPER_MAGIC};

    const CIFS_MAGIC: u64 = 0xFF53_4D42;
    const SMB2_MAGIC: u64 = 0xFE53_4D42;

    if fs_type == NFS_SUPER_MAGIC || fs_type == SMB_SUPER_MAGIC {
        return true;
    }
    // The raw word is signed on some targets; compare the low 32 bits only.
    #[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
    let magic = (fs_type.0 as u64) & 0xFFFF_FFFF;
    magic == CIFS_MAGIC || magic == SMB2_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unc_paths_are_network_everywhere() {
        let classifier = PathClassifier::default();
        assert!(classifier.is_network_path(Path::new(r"\\fileserver\share\inbox")));
        assert!(classifier.is_network_path(Path::new("//fileserver/share/inbox")));
    }

    #[cfg(unix)]
    #[test]
    fn conventional_mount_roots_are_network() {
        let classifier = PathClassifier::default();
        for path in ["/mnt/share/in", "/media/nas/file", "/net/host/x", "/smb/a", "/cifs/b"] {
            assert!(classifier.is_network_path(Path::new(path)), "{path}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn prefix_match_requires_the_separator() {
        assert!(!has_network_mount_prefix(Path::new("/mnt")));
        assert!(!has_network_mount_prefix(Path::new("/mntdata/file")));
        assert!(has_network_mount_prefix(Path::new("/mnt/data/file")));
    }

    #[test]
    fn missing_local_paths_are_not_network() {
        let classifier = PathClassifier::new(Duration::from_millis(50));
        assert!(!classifier.is_network_path(Path::new("relative/missing/path")));
    }

    #[test]
    fn missing_absolute_path_resolves_to_local() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let classifier = PathClassifier::new(Duration::from_millis(500));
        assert!(!classifier.is_network_path(&temp.path().join("absent").join("file.bin")));
        Ok(())
    }

    #[test]
    fn probe_on_an_existing_local_directory_never_panics() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let classifier = PathClassifier::new(Duration::from_millis(500));
        // A tempdir may live on any filesystem; only the absence of a panic is asserted.
        let _ = classifier.is_network_path(temp.path());
        Ok(())
    }
}
