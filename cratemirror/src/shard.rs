//! Sharded on-disk layout for mirrored artifacts.
//!
//! A registry holds a few million `.crate` files; dumping them into a single
//! directory makes most filesystems crawl. Artifacts are therefore placed in
//! a two-level directory tree derived from the crate name, matching the
//! layout used by existing registry mirrors so trees stay interchangeable.
//!
//! The mapping rules:
//!
//! * names of three characters or fewer get a single directory named after
//!   the crate (`ab` → `ab/`)
//! * names starting with `1`, `2` or `3` shard on the first character
//! * names whose second character is `-` shard on the first two characters
//! * everything else shards on the first character
//! * the second level is the next two characters, clamped to the name length

use std::path::{Path, PathBuf};

/// Returns the directory that holds all versions of the named crate.
///
/// The result is `<out_dir>/<shard1>[/<shard2>]`; see the module docs for
/// the sharding rules. An empty name maps to `out_dir` itself.
pub fn shard_dir(out_dir: &Path, name: &str) -> PathBuf {
    if name.is_empty() {
        return out_dir.to_path_buf();
    }
    let bytes = name.as_bytes();
    if bytes.len() <= 3 {
        return out_dir.join(name);
    }

    let first_len = match bytes[0] {
        b'1' | b'2' | b'3' => 1,
        _ if bytes[1] == b'-' => 2,
        _ => 1,
    };
    let second_end = (first_len + 2).min(bytes.len());

    let first = String::from_utf8_lossy(&bytes[..first_len]);
    let second = String::from_utf8_lossy(&bytes[first_len..second_end]);
    out_dir.join(first.as_ref()).join(second.as_ref())
}

/// Returns the canonical artifact filename for a crate version.
pub fn crate_filename(name: &str, version: &str) -> String {
    format!("{name}-{version}.crate")
}

/// Resolves the full on-disk path for a crate version under `out_dir`.
pub fn artifact_path(out_dir: &Path, name: &str, version: &str) -> PathBuf {
    shard_dir(out_dir, name).join(crate_filename(name, version))
}
