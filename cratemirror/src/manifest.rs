//! Append-only JSON-Lines manifest of fetch outcomes.
//!
//! Every descriptor the engine consumes produces exactly one record here,
//! success or not. The file doubles as the audit trail and the input for
//! resume tooling, so records are never rewritten; a new run appends to a
//! fresh file. Writes are serialized through a mutex because records arrive
//! from many workers in completion order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Schema version stamped into every record; bump on breaking changes.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Terminal outcome of one fetch descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Downloaded and verified.
    Ok,
    /// Failed after exhausting retries, or failed verification.
    Error,
    /// Already present on disk with a matching checksum; no network I/O.
    Skipped,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Ok => write!(f, "ok"),
            FetchStatus::Error => write!(f, "error"),
            FetchStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One manifest line describing the outcome of a single fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub schema_version: u32,
    /// Original request URL.
    pub url: String,
    /// On-disk artifact path.
    pub path: String,
    /// Bytes written; 0 when the fetch failed before any write.
    pub size: u64,
    /// Lowercase hex SHA-256; empty only if the file was never created.
    pub sha256: String,
    /// RFC3339 UTC timestamp taken when the fetch began.
    pub started_at: String,
    /// RFC3339 UTC timestamp taken when the record was emitted.
    pub finished_at: String,
    pub ok: bool,
    pub status: FetchStatus,
    /// Failure description; present exactly when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retry attempts beyond the first; 0 on first-try success.
    pub retries: u32,
}

/// Serialized writer appending one JSON object per line.
///
/// At most one record is encoded at any instant; workers contend on the
/// internal mutex only for the duration of a single small write.
#[derive(Debug)]
pub struct ManifestWriter {
    inner: Mutex<BufWriter<File>>,
}

impl ManifestWriter {
    /// Creates (truncating) the manifest file at `path`.
    pub fn create(path: &Path) -> Result<Self, crate::EngineError> {
        let file = File::create(path).map_err(|source| crate::EngineError::ManifestOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            inner: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Appends one record as a newline-terminated JSON object.
    pub fn write(&self, record: &FetchRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.inner.lock().expect("manifest writer poisoned");
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")
    }

    /// Flushes buffered records and syncs the file to disk.
    pub fn close(&self) -> std::io::Result<()> {
        let mut writer = self.inner.lock().expect("manifest writer poisoned");
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}
