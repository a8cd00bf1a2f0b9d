//! Registry index scanning and checksum collection.
//!
//! The crates.io index is a tree of line-delimited JSON files, one file per
//! crate and one line per published version. The scanner walks that tree,
//! filters out repository housekeeping files, and turns each surviving
//! version line into a [`FetchDescriptor`](crate::fetch::FetchDescriptor).
//!
//! Expected hashes live in a [`ChecksumIndex`] built from the same scan and
//! optionally overridden by an external JSON-Lines file, letting operators
//! pin hashes for URLs the index does not know about.

mod checksums;
mod scanner;

pub use checksums::ChecksumIndex;
pub use scanner::{read_url_list, scan_index, ScanOptions, DEFAULT_BASE_URL};
