//! Fatal error types for the mirroring engine.
//!
//! Per-artifact failures are recovered locally and recorded in the manifest;
//! they never surface here. `EngineError` covers the conditions that make a
//! run impossible to continue: unreadable index, unwritable manifest, a
//! bundler that cannot open its output, or an HTTP client that cannot be
//! built.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a mirroring run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to read the registry index tree.
    #[error("failed to read index at {path}: {source}")]
    IndexRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read the external checksum file or URL list.
    #[error("failed to read input file {path}: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create or write the manifest file.
    #[error("failed to open manifest {path}: {source}")]
    ManifestOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to open the bundle output directory or the first bundle file.
    #[error("failed to initialize bundler in {path}: {source}")]
    BundlerInit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create the artifact output directory.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to construct the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
