//! Walks a crates.io-index tree and emits fetch descriptors.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use walkdir::WalkDir;

use super::checksums::ChecksumIndex;
use crate::fetch::FetchDescriptor;
use crate::EngineError;

/// Default artifact base URL for crates.io.
pub const DEFAULT_BASE_URL: &str = "https://static.crates.io/crates";

/// One JSON line of an index file. Everything beyond these four fields
/// (deps, features, ...) is ignored.
#[derive(Debug, Deserialize)]
struct IndexEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    vers: String,
    #[serde(default)]
    cksum: String,
    #[serde(default)]
    yanked: bool,
}

/// Options controlling an index scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Base URL for artifact downloads; trailing slashes are trimmed.
    pub base_url: String,
    /// Keep versions their publisher has withdrawn.
    pub include_yanked: bool,
    /// Stop after emitting this many descriptors; 0 means unlimited.
    pub limit: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            include_yanked: false,
            limit: 0,
        }
    }
}

/// True for directories the walker must not descend into.
fn skip_dir(name: &str) -> bool {
    matches!(name, ".git" | ".github" | ".gitignore")
}

/// True for files that are registry housekeeping, not version listings.
fn skip_file(name: &str) -> bool {
    name == "config.json" || name.eq_ignore_ascii_case("README.md") || name.ends_with(".keep")
}

/// Scans an index tree into fetch descriptors plus the checksum index
/// derived from the `cksum` fields.
///
/// Malformed lines are skipped silently; blank lines and `#` comments are
/// ignored. With a non-zero limit the walk stops as soon as enough
/// descriptors were emitted rather than enumerating the whole tree.
pub fn scan_index(
    index_dir: &Path,
    options: &ScanOptions,
) -> Result<(Vec<FetchDescriptor>, ChecksumIndex), EngineError> {
    let base_url = options.base_url.trim_end_matches('/');
    let mut descriptors = Vec::new();
    let mut checksums = ChecksumIndex::new();

    let walker = WalkDir::new(index_dir)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && skip_dir(&e.file_name().to_string_lossy())));

    for entry in walker {
        if options.limit > 0 && descriptors.len() >= options.limit {
            break;
        }
        let entry = entry.map_err(|e| EngineError::IndexRead {
            path: index_dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if skip_file(&entry.file_name().to_string_lossy()) {
            continue;
        }

        let file = File::open(entry.path()).map_err(|source| EngineError::IndexRead {
            path: entry.path().to_path_buf(),
            source,
        })?;
        for line in BufReader::new(file).lines() {
            if options.limit > 0 && descriptors.len() >= options.limit {
                break;
            }
            let line = line.map_err(|source| EngineError::IndexRead {
                path: entry.path().to_path_buf(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: IndexEntry = match serde_json::from_str(line) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            if parsed.name.is_empty() || parsed.vers.is_empty() {
                continue;
            }
            if parsed.yanked && !options.include_yanked {
                continue;
            }

            let descriptor = FetchDescriptor::for_crate(base_url, &parsed.name, &parsed.vers);
            if !parsed.cksum.is_empty() {
                checksums.insert(descriptor.url.clone(), &parsed.cksum);
            }
            descriptors.push(descriptor);
        }
    }

    Ok((descriptors, checksums))
}

/// Loads a newline-delimited URL list, skipping blanks and `#` comments.
///
/// The alternative input mode for mirrors that already know their URLs;
/// expected hashes come solely from the external checksum file.
pub fn read_url_list(path: &Path) -> Result<Vec<FetchDescriptor>, EngineError> {
    let file = File::open(path).map_err(|source| EngineError::InputRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut descriptors = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| EngineError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        descriptors.push(FetchDescriptor::for_url(line));
    }
    Ok(descriptors)
}
