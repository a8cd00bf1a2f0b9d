//! cratemirror CLI - mirror a crates.io-style registry to local disk.
//!
//! This binary wires command-line flags into the `cratemirror` engine:
//! it reads fetch descriptors from a local registry index (or a plain URL
//! list), then downloads, verifies, optionally bundles, and manifests every
//! artifact.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cratemirror::bundle::{Bundler, BundlerConfig};
use cratemirror::fetch::{default_concurrency, EngineConfig, MirrorEngine, RetryPolicy};
use cratemirror::index::{read_url_list, scan_index, ChecksumIndex, ScanOptions};
use cratemirror::manifest::ManifestWriter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Human-readable text output
    Text,
    /// Newline-delimited JSON output
    Json,
}

#[derive(Parser)]
#[command(name = "cratemirror")]
#[command(about = "Mirror the crates.io registry for offline use", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a local crates.io-index checkout
    #[arg(long, conflicts_with = "list")]
    index_dir: Option<PathBuf>,

    /// Path to a newline-delimited URL list (alternative to --index-dir)
    #[arg(long)]
    list: Option<PathBuf>,

    /// Base URL for crate artifact downloads
    #[arg(long, default_value = "https://static.crates.io/crates")]
    crates_base_url: String,

    /// Include versions their publisher has yanked
    #[arg(long)]
    include_yanked: bool,

    /// Stop after this many descriptors (0 = unlimited)
    #[arg(long, default_value = "0")]
    limit: usize,

    /// Directory for the sharded artifact tree
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// Number of concurrent downloads (0 = auto)
    #[arg(long, default_value = "0")]
    concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "300")]
    timeout: u64,

    /// Optional JSONL file of {"url","sha256"} expected hashes
    #[arg(long)]
    checksums: Option<PathBuf>,

    /// Where to write the JSONL manifest of fetch outcomes
    #[arg(long, default_value = "manifest.jsonl")]
    manifest: PathBuf,

    /// Stream completed artifacts into rolling tar.zst bundles
    #[arg(long)]
    bundle: bool,

    /// Rotate bundles at this many GiB of uncompressed content
    #[arg(long, default_value = "8")]
    bundle_size_gb: u64,

    /// Directory for bundle archives
    #[arg(long, default_value = "bundles")]
    bundles_out: PathBuf,

    /// Total attempts per artifact for transient errors
    #[arg(long, default_value = "6")]
    retries: u32,

    /// Base backoff in milliseconds (exponential with jitter)
    #[arg(long, default_value = "500")]
    retry_base_ms: u64,

    /// Maximum backoff per attempt in seconds
    #[arg(long, default_value = "30")]
    retry_max_secs: u64,

    /// Log progress after every N processed artifacts (0 = disabled)
    #[arg(long, default_value = "0")]
    progress_every: u64,

    /// Periodic progress interval in seconds (0 = disabled)
    #[arg(long, default_value = "0")]
    progress_interval: u64,

    /// Logging format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Logging filter (e.g. "info", "cratemirror=debug")
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate inputs and count descriptors without downloading
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_new(&args.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if args.index_dir.is_none() && args.list.is_none() {
        eprintln!("error: provide --index-dir or --list");
        eprintln!("Usage: cratemirror --index-dir <path> --out <dir> [options]");
        process::exit(2);
    }
    if let Some(index_dir) = &args.index_dir {
        if !index_dir.is_dir() {
            error!(path = %index_dir.display(), "index directory not found");
            process::exit(2);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create runtime");
            process::exit(1);
        }
    };

    let code = runtime.block_on(run(args));
    process::exit(code);
}

async fn run(args: Args) -> i32 {
    // Build the descriptor set and its checksum index.
    let (mut descriptors, mut checksums) = if let Some(index_dir) = &args.index_dir {
        let options = ScanOptions {
            base_url: args.crates_base_url.clone(),
            include_yanked: args.include_yanked,
            limit: args.limit,
        };
        match scan_index(index_dir, &options) {
            Ok(scanned) => scanned,
            Err(e) => {
                error!(error = %e, "index scan failed");
                return 1;
            }
        }
    } else {
        let list = args.list.as_ref().expect("list mode");
        match read_url_list(list) {
            Ok(mut descriptors) => {
                if args.limit > 0 {
                    descriptors.truncate(args.limit);
                }
                (descriptors, ChecksumIndex::new())
            }
            Err(e) => {
                error!(error = %e, "url list read failed");
                return 1;
            }
        }
    };

    if let Some(path) = &args.checksums {
        if let Err(e) = checksums.merge_external(path) {
            error!(error = %e, "checksum file read failed");
            return 1;
        }
    }
    checksums.apply(&mut descriptors);

    let concurrency = if args.concurrency == 0 {
        default_concurrency()
    } else {
        args.concurrency
    };

    if args.dry_run {
        if let Err(e) = std::fs::create_dir_all(&args.out) {
            error!(path = %args.out.display(), error = %e, "cannot create output directory");
            return 1;
        }
        info!(
            descriptors = descriptors.len(),
            checksums = checksums.len(),
            concurrency,
            out = %args.out.display(),
            "dry-run ok"
        );
        return 0;
    }

    let bundler = if args.bundle {
        match Bundler::create(BundlerConfig::new(&args.bundles_out, args.bundle_size_gb)) {
            Ok(bundler) => Some(bundler),
            Err(e) => {
                error!(error = %e, "bundler init failed");
                return 1;
            }
        }
    } else {
        None
    };

    let manifest = match ManifestWriter::create(&args.manifest) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!(error = %e, "manifest create failed");
            return 1;
        }
    };

    let config = EngineConfig {
        out_dir: args.out.clone(),
        concurrency,
        request_timeout: Duration::from_secs(args.timeout.max(1)),
        retry: RetryPolicy {
            attempts: args.retries.max(1),
            base: Duration::from_millis(args.retry_base_ms.max(1)),
            max: Duration::from_secs(args.retry_max_secs.max(1)),
        },
        progress_every: args.progress_every,
        progress_interval: (args.progress_interval > 0)
            .then(|| Duration::from_secs(args.progress_interval)),
    };

    let engine = match MirrorEngine::new(config, manifest, bundler) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "engine init failed");
            return 1;
        }
    };

    // Ctrl-C cancels in-flight work; completed artifacts stay in place.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    match engine.run(descriptors, cancel).await {
        Ok(_summary) => 0,
        Err(e) => {
            error!(error = %e, "mirror run failed");
            1
        }
    }
}
