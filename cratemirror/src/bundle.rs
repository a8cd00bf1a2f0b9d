//! Rolling `tar.zst` bundles of completed artifacts.
//!
//! Destination filesystems for multi-million-file mirrors often run out of
//! inodes before they run out of space. The bundler streams completed
//! artifacts into size-rotated compressed tar archives as a side channel of
//! the download run, so operators can ship a handful of large files instead
//! of the whole tree.
//!
//! One bundle is open at a time as a `File` → zstd encoder → tar builder
//! stack owned exclusively by the bundler. Rotation closes the stack in
//! order and opens `bundle-NNNN.tar.zst` with the next index. Rotation is
//! driven by uncompressed byte accounting: compressed size is unknown until
//! the encoder flushes, and the uncompressed total is the usable proxy for
//! destination disk pressure.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use zstd::stream::Encoder;

/// zstd compression level for bundles; leans toward ratio over speed since
/// the network, not the encoder, is the bottleneck.
const BUNDLE_ZSTD_LEVEL: i32 = 8;

/// Errors from bundle operations.
///
/// These never fail the originating fetch; the engine logs and counts them.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle I/O error: {0}")]
    Io(#[from] io::Error),

    /// `add_file` was called after `close`.
    #[error("bundler is closed")]
    Closed,
}

/// Configuration for the rolling bundler.
#[derive(Debug, Clone)]
pub struct BundlerConfig {
    /// Directory that receives `bundle-NNNN.tar.zst` files.
    pub out_dir: PathBuf,
    /// Rotation threshold in uncompressed bytes.
    pub target_bytes: u64,
}

impl BundlerConfig {
    pub fn new(out_dir: impl Into<PathBuf>, target_gib: u64) -> Self {
        Self {
            out_dir: out_dir.into(),
            target_bytes: target_gib << 30,
        }
    }
}

struct OpenBundle {
    builder: tar::Builder<Encoder<'static, File>>,
    bytes: u64,
    /// Index of the *next* bundle to open.
    next_index: u64,
}

/// Streams files into size-rotated `tar.zst` archives.
pub struct Bundler {
    out_dir: PathBuf,
    target_bytes: u64,
    /// `None` once closed.
    state: Mutex<Option<OpenBundle>>,
}

/// Returns the filename for a bundle index, zero-padded to four digits.
///
/// Indices past 9999 widen naturally instead of truncating.
pub fn bundle_file_name(index: u64) -> String {
    format!("bundle-{index:04}.tar.zst")
}

/// Derives the in-bundle entry name for an artifact: `<host>/<filename>`,
/// falling back to the bare filename when the URL has no recognizable host.
pub fn entry_name(url: &str, filename: &str) -> String {
    match host_of(url) {
        Some(host) if !host.is_empty() => format!("{host}/{filename}"),
        _ => filename.to_string(),
    }
}

/// Extracts the host portion of an `http(s)://` URL without a full parser.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    Some(rest.split('/').next().unwrap_or(rest))
}

impl Bundler {
    /// Creates the output directory and opens the first bundle.
    pub fn create(config: BundlerConfig) -> Result<Self, crate::EngineError> {
        let wrap = |source: io::Error| crate::EngineError::BundlerInit {
            path: config.out_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&config.out_dir).map_err(wrap)?;

        let builder = open_bundle(&config.out_dir, 0).map_err(wrap)?;
        Ok(Self {
            out_dir: config.out_dir,
            target_bytes: config.target_bytes,
            state: Mutex::new(Some(OpenBundle {
                builder,
                bytes: 0,
                next_index: 1,
            })),
        })
    }

    /// Appends one on-disk file to the current bundle, rotating first when
    /// the uncompressed threshold would be exceeded. An empty bundle never
    /// rotates, so a file larger than the threshold lands alone in its own
    /// bundle instead of leaving an empty archive behind.
    ///
    /// Entry metadata is normalized (mode 0644, uid/gid 0, zero mtime) so
    /// bundles are byte-stable across runs with identical inputs.
    pub fn add_file(&self, path: &Path, entry: &str) -> Result<(), BundleError> {
        let size = std::fs::metadata(path)?.len();

        let mut guard = self.state.lock().expect("bundler poisoned");
        let state = guard.as_mut().ok_or(BundleError::Closed)?;

        if state.bytes > 0 && state.bytes + size > self.target_bytes {
            let next = state.next_index;
            let old = guard.take().expect("bundle state present");
            finish_bundle(old.builder)?;
            *guard = Some(OpenBundle {
                builder: open_bundle(&self.out_dir, next)?,
                bytes: 0,
                next_index: next + 1,
            });
        }
        let state = guard.as_mut().expect("bundle state present");

        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);

        let mut file = File::open(path)?;
        state.builder.append_data(&mut header, entry, &mut file)?;
        state.bytes += size;
        Ok(())
    }

    /// Closes the tar builder, the encoder, and the file, in that order.
    ///
    /// Safe to call more than once; `add_file` after close is an error.
    pub fn close(&self) -> Result<(), BundleError> {
        let mut guard = self.state.lock().expect("bundler poisoned");
        if let Some(state) = guard.take() {
            finish_bundle(state.builder)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("out_dir", &self.out_dir)
            .field("target_bytes", &self.target_bytes)
            .finish()
    }
}

fn open_bundle(out_dir: &Path, index: u64) -> io::Result<tar::Builder<Encoder<'static, File>>> {
    let path = out_dir.join(bundle_file_name(index));
    let file = File::create(path)?;
    let encoder = Encoder::new(file, BUNDLE_ZSTD_LEVEL)?;
    Ok(tar::Builder::new(encoder))
}

fn finish_bundle(builder: tar::Builder<Encoder<'static, File>>) -> io::Result<()> {
    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()
}
