//! Streaming SHA-256 verification of downloaded artifacts.
//!
//! Artifacts are hashed from disk through a fixed 1 MiB buffer so memory use
//! stays flat regardless of file size. The digest is always returned, even
//! when no expected hash is known, so it can be written into the manifest
//! record for later audits.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read buffer for hashing (1 MiB).
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Outcome of verifying a file against an optional expected hash.
#[derive(Debug, Clone)]
pub struct Verification {
    /// True when the digest matches the expected hash, or when no expected
    /// hash was supplied.
    pub matches: bool,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
}

/// Computes the lowercase hex SHA-256 of a file.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes `path` and compares against `expected` when supplied.
///
/// Comparison is case-insensitive hex equality. With `expected == None` the
/// file is accepted and the computed digest still returned.
pub fn verify_file(path: &Path, expected: Option<&str>) -> std::io::Result<Verification> {
    let sha256 = hash_file(path)?;
    let matches = match expected {
        Some(want) if !want.is_empty() => want.eq_ignore_ascii_case(&sha256),
        _ => true,
    };
    Ok(Verification { matches, sha256 })
}
