//! Discovery of input files and their archive classification.
//!
//! # Design
//! - Tasks are keyed by absolute path in an ordered map: no duplicate can slip in
//!   and iteration order is stable across runs.
//! - File names stay as raw `OsString`s so nothing is lost before upload.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// Extensions (lowercase, without the dot) treated as archives.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[
    "7z", "arj", "bz2", "cab", "dmg", "gz", "img", "iso", "msi", "pkg", "rar", "tar", "tbz2",
    "tbz", "tb2", "tgz", "xz", "zip", "udf", "qcow2",
];

/// Identity of one file to be scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    file_name: OsString,
    sub_dir: PathBuf,
    full_path: PathBuf,
}

impl FileTask {
    /// Describe a file by name, directory relative to the scan root, and absolute path.
    #[must_use]
    pub fn new(
        file_name: impl Into<OsString>,
        sub_dir: impl Into<PathBuf>,
        full_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            sub_dir: sub_dir.into(),
            full_path: full_path.into(),
        }
    }

    /// Final path component.
    #[must_use]
    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }

    /// Directory relative to the scan root; empty for top-level files.
    #[must_use]
    pub fn sub_dir(&self) -> &Path {
        &self.sub_dir
    }

    /// Absolute source path.
    #[must_use]
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// `root/<sub_dir>/<file_name>`: where this file lands under another tree.
    #[must_use]
    pub fn mirrored_in(&self, root: &Path) -> PathBuf {
        self.mirrored_dir(root).join(&self.file_name)
    }

    /// `root/<sub_dir>`.
    #[must_use]
    pub fn mirrored_dir(&self, root: &Path) -> PathBuf {
        if self.sub_dir.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(&self.sub_dir)
        }
    }

    /// Whether the file's extension marks it as an archive.
    #[must_use]
    pub fn is_archive(&self) -> bool {
        is_archive_name(&self.file_name)
    }
}

/// Case-insensitive archive check on a file name.
#[must_use]
pub fn is_archive_name(name: &OsStr) -> bool {
    Path::new(name)
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
}

/// Files found under a scan root, split by archive classification.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Non-archive files, eligible for parallel handling.
    pub regular: Vec<FileTask>,
    /// Archive files, handled one at a time.
    pub archives: Vec<FileTask>,
}

impl Discovery {
    /// Total number of discovered files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regular.len() + self.archives.len()
    }

    /// Whether nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regular.is_empty() && self.archives.is_empty()
    }
}

/// Recursively collect every regular file under `root`.
///
/// # Errors
///
/// Returns an error when the tree cannot be traversed.
pub fn discover_files(root: &Path) -> FsOpsResult<Discovery> {
    let mut tasks = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| FsOpsError::walkdir("discover.walk", root, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let full_path = entry.path().to_path_buf();
        let sub_dir = full_path
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .ok_or_else(|| FsOpsError::InvalidInput {
                field: "full_path",
                reason: "outside_root",
                value: Some(full_path.display().to_string()),
            })?;
        let task = FileTask::new(entry.file_name(), sub_dir, full_path.clone());
        tasks.entry(full_path).or_insert(task);
    }

    let (archives, regular) = tasks.into_values().partition(FileTask::is_archive);
    Ok(Discovery { regular, archives })
}
