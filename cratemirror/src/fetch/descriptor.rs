//! Fetch descriptors: the unit of work for the download engine.

use sha2::{Digest, Sha256};

/// Everything a worker needs to fetch one artifact.
///
/// Immutable once the checksum index has been applied; consumed exactly
/// once and replaced by a manifest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchDescriptor {
    /// Source URL.
    pub url: String,
    /// Logical crate name, used for directory sharding.
    pub crate_name: String,
    /// Sanitized output filename (last URL path segment).
    pub filename: String,
    /// Expected lowercase hex SHA-256, when known.
    pub expected_sha256: Option<String>,
}

impl FetchDescriptor {
    /// Builds the descriptor for a crate version:
    /// `<base_url>/<name>/<name>-<vers>.crate`.
    pub fn for_crate(base_url: &str, name: &str, version: &str) -> Self {
        let filename = crate::shard::crate_filename(name, version);
        Self {
            url: format!("{}/{}/{}", base_url.trim_end_matches('/'), name, filename),
            crate_name: name.to_string(),
            filename,
            expected_sha256: None,
        }
    }

    /// Builds a descriptor for a bare URL (list-input mode), deriving the
    /// crate name and output filename from the URL path.
    pub fn for_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            crate_name: crate_name_from_url(url),
            filename: sanitize_filename(url),
            expected_sha256: None,
        }
    }
}

/// Derives an output filename from the last path segment of a URL.
///
/// Path traversal and query characters are flattened to `_`; an empty
/// segment falls back to the SHA-256 of nothing so the name stays unique
/// and predictable.
pub fn sanitize_filename(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url).trim();
    if segment.is_empty() {
        return format!("{:x}", Sha256::new().finalize());
    }
    segment.replace("..", "_").replace(['?', '&'], "_")
}

/// Extracts the crate name from an artifact URL shaped like
/// `https://host/crates/<name>/<name>-<vers>.crate`: the second-to-last
/// path segment. Returns an empty string when the URL is too shallow.
pub fn crate_name_from_url(url: &str) -> String {
    let rest = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => url,
    };
    // drop the host
    let path = match rest.find('/') {
        Some(i) => &rest[i + 1..],
        None => return String::new(),
    };
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2].to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_crate_url_shape() {
        let d = FetchDescriptor::for_crate("https://static.crates.io/crates/", "serde", "1.0.147");
        assert_eq!(
            d.url,
            "https://static.crates.io/crates/serde/serde-1.0.147.crate"
        );
        assert_eq!(d.crate_name, "serde");
        assert_eq!(d.filename, "serde-1.0.147.crate");
        assert!(d.expected_sha256.is_none());
    }

    #[test]
    fn test_for_url_derives_name_and_filename() {
        let d =
            FetchDescriptor::for_url("https://static.crates.io/crates/serde/serde-1.0.0.crate");
        assert_eq!(d.crate_name, "serde");
        assert_eq!(d.filename, "serde-1.0.0.crate");
    }

    #[test]
    fn test_sanitize_flattens_special_characters() {
        let name = sanitize_filename("https://example.com/x/file?foo=1&bar=2");
        assert!(name.contains('_'));
        assert!(!name.contains('?'));
        assert!(!name.contains('&'));
        assert_eq!(
            sanitize_filename("https://example.com/a/../evil"),
            "evil"
        );
        assert_eq!(sanitize_filename("https://example.com/a/b..c"), "b_c");
    }

    #[test]
    fn test_sanitize_empty_segment_falls_back_to_digest() {
        let name = sanitize_filename("https://example.com/");
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_crate_name_from_url_shallow_paths() {
        assert_eq!(crate_name_from_url("https://host/a/b.crate"), "a");
        assert_eq!(crate_name_from_url("https://host/b.crate"), "");
        assert_eq!(crate_name_from_url("https://host"), "");
    }
}
