//! End-to-end engine tests against a scripted local HTTP server.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use cratemirror::bundle::{Bundler, BundlerConfig};
use cratemirror::fetch::{EngineConfig, FetchDescriptor, MirrorEngine, RetryPolicy};
use cratemirror::manifest::{FetchRecord, FetchStatus, ManifestWriter};

/// Minimal scripted HTTP/1.1 server: each accepted connection consumes the
/// next `(status, body)` from the script; an exhausted script serves 404.
struct StubServer {
    addr: std::net::SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    async fn start(script: Vec<(u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(Mutex::new(VecDeque::from(script)));

        let accept_hits = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                accept_hits.fetch_add(1, Ordering::SeqCst);
                let (status, body) = script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or((404, b"not found".to_vec()));
                tokio::spawn(async move {
                    // drain the request head before answering
                    let mut buf = [0u8; 4096];
                    let mut head = Vec::new();
                    loop {
                        let Ok(n) = socket.read(&mut buf).await else {
                            return;
                        };
                        if n == 0 {
                            break;
                        }
                        head.extend_from_slice(&buf[..n]);
                        if head.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let header = format!(
                        "HTTP/1.1 {status} STUB\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, hits }
    }

    fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn crate_url(&self, name: &str, version: &str) -> String {
        format!(
            "http://{}/crates/{name}/{name}-{version}.crate",
            self.addr
        )
    }
}

fn descriptor(server: &StubServer, name: &str, version: &str, payload: Option<&[u8]>) -> FetchDescriptor {
    FetchDescriptor {
        url: server.crate_url(name, version),
        crate_name: name.to_string(),
        filename: format!("{name}-{version}.crate"),
        expected_sha256: payload.map(sha256_hex),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn test_config(out_dir: &Path) -> EngineConfig {
    EngineConfig {
        out_dir: out_dir.to_path_buf(),
        concurrency: 2,
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            attempts: 3,
            base: Duration::from_millis(1),
            max: Duration::from_millis(10),
        },
        progress_every: 0,
        progress_interval: None,
    }
}

async fn run_engine(
    config: EngineConfig,
    manifest_path: &Path,
    bundler: Option<Bundler>,
    descriptors: Vec<FetchDescriptor>,
) {
    let manifest = ManifestWriter::create(manifest_path).unwrap();
    let engine = MirrorEngine::new(config, manifest, bundler).unwrap();
    engine
        .run(descriptors, CancellationToken::new())
        .await
        .unwrap();
}

fn read_manifest(path: &Path) -> Vec<FetchRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn assert_no_part_files(root: &Path) {
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy();
        assert!(!name.ends_with(".part"), "leftover temp file: {name}");
    }
}

fn bundle_entry_count(path: &Path) -> usize {
    let file = std::fs::File::open(path).unwrap();
    let decoder = zstd::stream::Decoder::new(file).unwrap();
    let mut archive = tar::Archive::new(decoder);
    archive.entries().unwrap().count()
}

#[tokio::test]
async fn happy_path_single_artifact() {
    let payload = b"serde-crate-bytes"; // 17 bytes
    let server = StubServer::start(vec![(200, payload.to_vec())]).await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let desc = descriptor(&server, "serde", "1.0.0", Some(payload));
    run_engine(test_config(&out), &manifest_path, None, vec![desc]).await;

    let artifact = out.join("s/er/serde-1.0.0.crate");
    assert_eq!(std::fs::read(&artifact).unwrap(), payload);

    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.ok);
    assert_eq!(record.status, FetchStatus::Ok);
    assert_eq!(record.size, 17);
    assert_eq!(record.retries, 0);
    assert_eq!(record.sha256, sha256_hex(payload));
    assert!(record.error.is_none());
    assert_no_part_files(&out);
}

#[tokio::test]
async fn checksum_mismatch_keeps_file_and_fails_record() {
    let payload = b"corrupted-body-17";
    let server = StubServer::start(vec![(200, payload.to_vec())]).await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let mut desc = descriptor(&server, "serde", "1.0.0", Some(payload));
    desc.expected_sha256 = Some("0".repeat(64));
    run_engine(test_config(&out), &manifest_path, None, vec![desc]).await;

    // file is kept for forensic inspection
    let artifact = out.join("s/er/serde-1.0.0.crate");
    assert!(artifact.exists());

    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(!record.ok);
    assert_eq!(record.status, FetchStatus::Error);
    assert_eq!(record.error.as_deref(), Some("checksum mismatch"));
    assert_eq!(record.sha256, sha256_hex(payload));
    assert_no_part_files(&out);
}

#[tokio::test]
async fn retries_on_503_then_succeeds() {
    let payload = b"finally-served";
    let server = StubServer::start(vec![
        (503, b"busy".to_vec()),
        (503, b"busy".to_vec()),
        (200, payload.to_vec()),
    ])
    .await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let desc = descriptor(&server, "serde", "1.0.0", Some(payload));
    run_engine(test_config(&out), &manifest_path, None, vec![desc]).await;

    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 1);
    assert!(records[0].ok);
    assert_eq!(records[0].retries, 2);
    assert_eq!(server.hit_count(), 3);
}

#[tokio::test]
async fn permanent_503_exhausts_retry_budget() {
    let server = StubServer::start(vec![
        (503, b"busy".to_vec()),
        (503, b"busy".to_vec()),
        (503, b"busy".to_vec()),
    ])
    .await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let desc = descriptor(&server, "serde", "1.0.0", None);
    run_engine(test_config(&out), &manifest_path, None, vec![desc]).await;

    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 1);
    assert!(!records[0].ok);
    // attempts = 3 configured, so retries beyond the first = 2
    assert_eq!(records[0].retries, 2);
    assert_eq!(server.hit_count(), 3);
}

#[tokio::test]
async fn permanent_404_fails_without_retry() {
    let server = StubServer::start(vec![(404, b"gone".to_vec())]).await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let desc = descriptor(&server, "serde", "1.0.0", None);
    run_engine(test_config(&out), &manifest_path, None, vec![desc]).await;

    assert!(!out.join("s/er/serde-1.0.0.crate").exists());
    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(!record.ok);
    assert_eq!(record.status, FetchStatus::Error);
    assert_eq!(record.retries, 0);
    assert!(record.error.as_deref().unwrap().contains("404"));
    assert_eq!(server.hit_count(), 1);
    assert_no_part_files(&out);
}

#[tokio::test]
async fn resume_skips_verified_artifact_without_network() {
    let payload = b"already-on-disk";
    let server = StubServer::start(vec![]).await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let artifact = out.join("s/er/serde-1.0.0.crate");
    std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    std::fs::write(&artifact, payload).unwrap();

    let desc = descriptor(&server, "serde", "1.0.0", Some(payload));
    run_engine(test_config(&out), &manifest_path, None, vec![desc]).await;

    assert_eq!(server.hit_count(), 0);
    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.ok);
    assert_eq!(record.status, FetchStatus::Skipped);
    assert_eq!(record.sha256, sha256_hex(payload));
}

#[tokio::test]
async fn second_run_is_fully_skipped() {
    let payload_a = b"artifact-a";
    let payload_b = b"artifact-b";
    let server = StubServer::start(vec![
        (200, payload_a.to_vec()),
        (200, payload_b.to_vec()),
    ])
    .await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");

    // serialize the two fetches so the scripted bodies match their URLs
    let first = descriptor(&server, "serde", "1.0.0", Some(payload_a));
    let second = descriptor(&server, "tokio", "1.0.0", Some(payload_b));
    let mut config = test_config(&out);
    config.concurrency = 1;

    let first_manifest = temp.path().join("manifest-1.jsonl");
    run_engine(
        config.clone(),
        &first_manifest,
        None,
        vec![first.clone(), second.clone()],
    )
    .await;
    let hits_after_first = server.hit_count();
    assert_eq!(hits_after_first, 2);

    let second_manifest = temp.path().join("manifest-2.jsonl");
    run_engine(config, &second_manifest, None, vec![first, second]).await;

    assert_eq!(server.hit_count(), hits_after_first, "no new requests");
    let records = read_manifest(&second_manifest);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(record.ok);
        assert_eq!(record.status, FetchStatus::Skipped);
    }
}

#[tokio::test]
async fn zero_threshold_bundling_rotates_per_artifact() {
    let payload_a = b"bundle-me-first";
    let payload_b = b"bundle-me-second";
    let server = StubServer::start(vec![
        (200, payload_a.to_vec()),
        (200, payload_b.to_vec()),
    ])
    .await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let bundles = temp.path().join("bundles");
    let manifest_path = temp.path().join("manifest.jsonl");

    let first = descriptor(&server, "serde", "1.0.0", Some(payload_a));
    let second = descriptor(&server, "tokio", "1.0.0", Some(payload_b));
    let mut config = test_config(&out);
    config.concurrency = 1;

    let bundler = Bundler::create(BundlerConfig {
        out_dir: bundles.clone(),
        target_bytes: 0,
    })
    .unwrap();
    run_engine(config, &manifest_path, Some(bundler), vec![first, second]).await;

    let mut names: Vec<String> = std::fs::read_dir(&bundles)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["bundle-0000.tar.zst", "bundle-0001.tar.zst"]);
    for name in &names {
        assert_eq!(bundle_entry_count(&bundles.join(name)), 1);
    }

    // bundle entries match the set of fresh successful downloads
    let ok_records = read_manifest(&manifest_path)
        .into_iter()
        .filter(|r| r.ok && r.status == FetchStatus::Ok)
        .count();
    assert_eq!(ok_records, 2);
}

#[tokio::test]
async fn every_descriptor_yields_exactly_one_record() {
    let payload = b"mixed-run-payload";
    // one success, one 404, one success
    let server = StubServer::start(vec![
        (200, payload.to_vec()),
        (404, b"gone".to_vec()),
        (200, payload.to_vec()),
    ])
    .await;
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let manifest_path = temp.path().join("manifest.jsonl");

    let descriptors = vec![
        descriptor(&server, "serde", "1.0.0", Some(payload)),
        descriptor(&server, "tokio", "1.0.0", None),
        descriptor(&server, "rand", "1.0.0", Some(payload)),
    ];
    let mut config = test_config(&out);
    config.concurrency = 1;
    config.retry.attempts = 1;
    run_engine(config, &manifest_path, None, descriptors).await;

    let records = read_manifest(&manifest_path);
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|r| r.ok).count(), 2);
    assert_eq!(records.iter().filter(|r| !r.ok).count(), 1);
    assert_no_part_files(&out);
}
