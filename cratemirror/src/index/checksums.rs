//! URL → expected SHA-256 mapping.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::fetch::FetchDescriptor;
use crate::EngineError;

/// One line of an external checksum file: `{"url": "...", "sha256": "..."}`.
#[derive(Debug, Deserialize)]
struct ChecksumEntry {
    #[serde(default)]
    url: String,
    #[serde(default)]
    sha256: String,
}

/// Immutable-per-run mapping from artifact URL to expected lowercase hex
/// SHA-256, built from the registry index and optionally overridden by an
/// external JSON-Lines file. External entries win on conflict, and loading
/// is order-independent within each source.
#[derive(Debug, Default, Clone)]
pub struct ChecksumIndex {
    map: HashMap<String, String>,
}

impl ChecksumIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a hash, lowercasing it on the way in.
    pub fn insert(&mut self, url: String, sha256: &str) {
        self.map.insert(url, sha256.to_ascii_lowercase());
    }

    /// Returns the expected hash for a URL, if known.
    pub fn get(&self, url: &str) -> Option<&str> {
        self.map.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Merges an external JSON-Lines checksum file over this index.
    ///
    /// Lines that are blank, malformed, or missing either field are skipped;
    /// surviving entries replace index-derived hashes for the same URL.
    pub fn merge_external(&mut self, path: &Path) -> Result<(), EngineError> {
        let file = File::open(path).map_err(|source| EngineError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| EngineError::InputRead {
                path: path.to_path_buf(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: ChecksumEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if entry.url.is_empty() || entry.sha256.is_empty() {
                continue;
            }
            self.insert(entry.url, &entry.sha256);
        }
        Ok(())
    }

    /// Stamps the final expected hash onto each descriptor.
    pub fn apply(&self, descriptors: &mut [FetchDescriptor]) {
        for descriptor in descriptors {
            if let Some(hash) = self.get(&descriptor.url) {
                descriptor.expected_sha256 = Some(hash.to_string());
            }
        }
    }
}
