//! # Hash Store
//!
//! Content fingerprints for change detection. A fingerprint is the lowercase hex SHA-256 of
//! the file's bytes, computed by streaming the file through the hasher in fixed-size chunks so
//! large files never sit in memory at once.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use sha2::{Digest, Sha256};
use crate::error::{Result, SyncError};

/// Read buffer size used while streaming a file through the hasher.
const CHUNK_SIZE: usize = 8 * 1024;

/// A content digest in its canonical lowercase hex form.
pub type Fingerprint = String;

/// Computes the fingerprint of the file at `path`.
///
/// # Errors
///
/// Returns [`SyncError::Read`] when the file cannot be opened or a read fails part way.
/// Callers must treat that as "needs action", never as "in sync".
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let read_error = |source: std::io::Error| SyncError::Read { path: path.to_path_buf(), source };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint of an in-memory buffer. Matches [`fingerprint`] for a file with the same bytes.
#[cfg(test)]
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    format!("{:x}", Sha256::digest(bytes))
}
