//! Streaming SHA-1 content hashing.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

/// Read size used when hashing; memory use stays flat regardless of file size.
pub const HASH_BLOCK_SIZE: usize = 8 * 1024;

/// Hash the file at `path` and return the lowercase hex digest.
///
/// # Errors
///
/// Returns the underlying IO error when the file cannot be opened or read.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut block = vec![0_u8; HASH_BLOCK_SIZE];
    loop {
        let read = match file.read(&mut block) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&block[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
