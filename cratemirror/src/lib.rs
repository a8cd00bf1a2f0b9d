//! CrateMirror - Offline mirroring engine for the crates.io registry
//!
//! This library downloads the artifacts of a crates.io-style registry into a
//! local sharded directory tree suitable for air-gapped consumption. It
//! combines an index scanner, a concurrent fetch engine, a streaming
//! integrity verifier, an optional rolling `tar.zst` bundler, and an
//! append-only JSON-Lines manifest used for resume and audit.
//!
//! # Architecture
//!
//! ```text
//! Index Scanner ──► descriptor queue ──► Fetch Workers ──► Manifest Writer
//!                                             │
//!                                             ├──► sharded artifact tree
//!                                             └──► Rolling Bundler (tar.zst)
//! ```
//!
//! All workers observe a shared metrics hub and a single cancellation token.
//! A descriptor whose artifact is already on disk with a matching checksum is
//! skipped without touching the network, which makes re-runs cheap.
//!
//! # Example
//!
//! ```no_run
//! use cratemirror::fetch::{EngineConfig, MirrorEngine};
//! use cratemirror::index::{scan_index, ScanOptions};
//! use cratemirror::manifest::ManifestWriter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), cratemirror::EngineError> {
//! let (mut descriptors, checksums) =
//!     scan_index("crates.io-index".as_ref(), &ScanOptions::default())?;
//! checksums.apply(&mut descriptors);
//!
//! let manifest = ManifestWriter::create("manifest.jsonl".as_ref())?;
//! let engine = MirrorEngine::new(EngineConfig::default(), manifest, None)?;
//! engine.run(descriptors, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod error;
pub mod fetch;
pub mod index;
pub mod manifest;
pub mod shard;
pub mod telemetry;
pub mod verify;

pub use bundle::{Bundler, BundlerConfig};
pub use error::EngineError;
pub use fetch::{EngineConfig, FetchDescriptor, MirrorEngine, MirrorSummary, RetryPolicy};
pub use index::{read_url_list, scan_index, ChecksumIndex, ScanOptions};
pub use manifest::{FetchRecord, FetchStatus, ManifestWriter};
pub use telemetry::{MetricsSnapshot, MirrorMetrics};
