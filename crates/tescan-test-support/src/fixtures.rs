//! Temporary directory layouts for scan tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway tree with an input root and the four output roots.
#[derive(Debug)]
pub struct ScanTree {
    temp: TempDir,
}

impl ScanTree {
    /// Create the tree with an empty input directory. Output roots are not created.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("input"))?;
        Ok(Self { temp })
    }

    /// Directory containing every root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Input root.
    #[must_use]
    pub fn input(&self) -> PathBuf {
        self.root().join("input")
    }

    /// Reports root.
    #[must_use]
    pub fn reports(&self) -> PathBuf {
        self.root().join("reports")
    }

    /// Benign root.
    #[must_use]
    pub fn benign(&self) -> PathBuf {
        self.root().join("benign")
    }

    /// Quarantine root.
    #[must_use]
    pub fn quarantine(&self) -> PathBuf {
        self.root().join("quarantine")
    }

    /// Error root.
    #[must_use]
    pub fn error(&self) -> PathBuf {
        self.root().join("error")
    }

    /// Write `contents` to `relative` under the input root, creating parents.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be written.
    pub fn write_input(&self, relative: impl AsRef<Path>, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.input().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }
}
