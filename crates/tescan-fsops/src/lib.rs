//! Filesystem primitives for the appliance scanner: name encoding, path
//! classification, discovery, directory preflight and safe relocation.
#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

pub mod checksum;
pub mod classify;
pub mod codec;
pub mod directory;
pub mod discover;
pub mod error;
pub mod relocate;

pub use checksum::{HASH_BLOCK_SIZE, sha1_file};
pub use classify::{PathClassifier, is_unc_path};
pub use codec::FilenameCodec;
pub use directory::{
    DirectoryMode, DirectoryStatus, PreflightPolicy, ensure_directory, prune_empty_directories,
};
pub use discover::{ARCHIVE_EXTENSIONS, Discovery, FileTask, discover_files, is_archive_name};
pub use error::{FsOpsError, FsOpsResult};
pub use relocate::{
    BackoffPolicy, DEFAULT_MOVE_ATTEMPTS, MoveFailure, RelocationOutcome, RenameOrCopy,
    SafeRelocator, Transfer, copy_then_remove,
};
