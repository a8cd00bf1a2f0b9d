//! The per-descriptor fetch procedure.
//!
//! Each worker runs this sequentially for every descriptor it pulls off the
//! queue: resolve the sharded target path, short-circuit via the resume
//! check, otherwise download through a `.part` temp file with bounded
//! retries, verify the result, and hand successful artifacts to the
//! bundler. Every path out of here produces exactly one manifest record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::descriptor::FetchDescriptor;
use super::retry::{classify_status, classify_transport, FailureKind, RetryPolicy};
use crate::bundle::{self, Bundler};
use crate::manifest::{FetchRecord, FetchStatus, MANIFEST_SCHEMA_VERSION};
use crate::shard;
use crate::telemetry::MirrorMetrics;
use crate::verify::{self, Verification};

/// Shared state handed to every worker.
pub(crate) struct WorkerContext {
    pub client: reqwest::Client,
    pub out_dir: PathBuf,
    pub retry: RetryPolicy,
    pub request_timeout: std::time::Duration,
    pub metrics: Arc<MirrorMetrics>,
    pub bundler: Option<Arc<Bundler>>,
    pub cancel: CancellationToken,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Outcome of the download loop, before verification.
enum DownloadOutcome {
    /// Bytes written and attempts used.
    Complete { size: u64, attempts: u32 },
    /// Terminal failure with attempts used.
    Failed { error: String, attempts: u32 },
}

/// Fetches one descriptor to completion and returns its manifest record.
pub(crate) async fn fetch_one(ctx: &WorkerContext, descriptor: &FetchDescriptor) -> FetchRecord {
    let started_at = now_rfc3339();
    let target_dir = shard::shard_dir(&ctx.out_dir, &descriptor.crate_name);
    let target = target_dir.join(&descriptor.filename);
    let mut record = FetchRecord {
        schema_version: MANIFEST_SCHEMA_VERSION,
        url: descriptor.url.clone(),
        path: target.to_string_lossy().into_owned(),
        size: 0,
        sha256: String::new(),
        started_at,
        finished_at: String::new(),
        ok: false,
        status: FetchStatus::Error,
        error: None,
        retries: 0,
    };

    if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
        return fail(record, format!("create {}: {e}", target_dir.display()), ctx);
    }

    // Resume check: an existing artifact that hashes clean is not re-fetched.
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        match hash_on_disk(&target, descriptor.expected_sha256.as_deref()).await {
            Ok(v) if v.matches => {
                record.size = tokio::fs::metadata(&target).await.map(|m| m.len()).unwrap_or(0);
                record.sha256 = v.sha256;
                record.ok = true;
                record.status = FetchStatus::Skipped;
                record.finished_at = now_rfc3339();
                ctx.metrics.record_skipped();
                return record;
            }
            // mismatch or unreadable: fall through to a fresh download
            _ => {}
        }
    }

    let outcome = download_with_retries(ctx, descriptor, &target).await;
    match outcome {
        DownloadOutcome::Failed { error, attempts } => {
            record.retries = attempts.saturating_sub(1);
            fail(record, error, ctx)
        }
        DownloadOutcome::Complete { size, attempts } => {
            record.retries = attempts.saturating_sub(1);
            record.size = size;
            match hash_on_disk(&target, descriptor.expected_sha256.as_deref()).await {
                Err(e) => fail(record, format!("hash {}: {e}", target.display()), ctx),
                Ok(Verification { matches: false, sha256 }) => {
                    // keep the file on disk for forensic inspection
                    record.sha256 = sha256;
                    fail(record, "checksum mismatch".to_string(), ctx)
                }
                Ok(Verification { sha256, .. }) => {
                    record.sha256 = sha256;
                    record.ok = true;
                    record.status = FetchStatus::Ok;
                    record.finished_at = now_rfc3339();
                    ctx.metrics.record_ok(size);
                    hand_off_to_bundler(ctx, descriptor, &target).await;
                    record
                }
            }
        }
    }
}

fn fail(mut record: FetchRecord, error: String, ctx: &WorkerContext) -> FetchRecord {
    record.ok = false;
    record.status = FetchStatus::Error;
    record.error = Some(error);
    record.finished_at = now_rfc3339();
    ctx.metrics.record_error();
    record
}

async fn hash_on_disk(target: &Path, expected: Option<&str>) -> std::io::Result<Verification> {
    let path = target.to_path_buf();
    let expected = expected.map(str::to_string);
    tokio::task::spawn_blocking(move || verify::verify_file(&path, expected.as_deref()))
        .await
        .map_err(std::io::Error::other)?
}

/// Runs the bounded retry loop for one descriptor.
///
/// The payload streams into `<target>.part`, which is renamed over the
/// final path only after a clean EOF; every failure path removes the temp
/// file before returning, so partial downloads are never observable.
async fn download_with_retries(
    ctx: &WorkerContext,
    descriptor: &FetchDescriptor,
    target: &Path,
) -> DownloadOutcome {
    let tmp = target.with_file_name(format!("{}.part", descriptor.filename));
    let mut attempts = 0u32;
    let mut last_error = String::new();
    let max_attempts = ctx.retry.attempts.max(1);

    while attempts < max_attempts {
        attempts += 1;

        let (kind, error) = match attempt_download(ctx, descriptor, target, &tmp).await {
            Ok(size) => return DownloadOutcome::Complete { size, attempts },
            Err(e) => e,
        };
        let _ = tokio::fs::remove_file(&tmp).await;
        last_error = error;

        match kind {
            FailureKind::Fatal | FailureKind::Cancelled => break,
            FailureKind::Retryable => {}
        }

        if attempts < max_attempts {
            let backoff = ctx.retry.backoff(attempts);
            warn!(
                attempt = attempts,
                max = max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                url = %descriptor.url,
                error = %last_error,
                "retrying"
            );
            ctx.metrics.record_retry();
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = ctx.cancel.cancelled() => break,
            }
        }
    }

    DownloadOutcome::Failed {
        error: last_error,
        attempts,
    }
}

/// One download attempt: GET, stream to the temp file, rename into place.
async fn attempt_download(
    ctx: &WorkerContext,
    descriptor: &FetchDescriptor,
    target: &Path,
    tmp: &Path,
) -> Result<u64, (FailureKind, String)> {
    if ctx.cancel.is_cancelled() {
        return Err((FailureKind::Cancelled, "cancelled".to_string()));
    }

    let file = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| (FailureKind::Fatal, format!("create {}: {e}", tmp.display())))?;
    let mut writer = BufWriter::new(file);

    ctx.metrics.request_started();
    let result = stream_response(ctx, descriptor, &mut writer).await;
    ctx.metrics.request_finished();
    let size = result?;

    writer
        .flush()
        .await
        .map_err(|e| (FailureKind::Fatal, format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(tmp, target)
        .await
        .map_err(|e| (FailureKind::Fatal, format!("rename {}: {e}", target.display())))?;
    Ok(size)
}

async fn stream_response(
    ctx: &WorkerContext,
    descriptor: &FetchDescriptor,
    writer: &mut BufWriter<tokio::fs::File>,
) -> Result<u64, (FailureKind, String)> {
    let request = ctx
        .client
        .get(&descriptor.url)
        .timeout(ctx.request_timeout);

    let response = tokio::select! {
        r = request.send() => {
            r.map_err(|e| (classify_transport(&e), e.to_string()))?
        }
        _ = ctx.cancel.cancelled() => {
            return Err((FailureKind::Cancelled, "cancelled".to_string()));
        }
    };

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err((classify_status(status), format!("HTTP {}", status.as_u16())));
    }

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    loop {
        let chunk = tokio::select! {
            c = stream.next() => c,
            _ = ctx.cancel.cancelled() => {
                return Err((FailureKind::Cancelled, "cancelled".to_string()));
            }
        };
        let chunk = match chunk {
            None => break,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err((classify_transport(&e), e.to_string())),
        };
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| (FailureKind::Fatal, format!("write: {e}")))?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

/// Streams a completed artifact into the bundler, when one is attached.
///
/// Bundler failures are logged and counted but never demote the fetch: the
/// artifact is already safe on disk.
async fn hand_off_to_bundler(ctx: &WorkerContext, descriptor: &FetchDescriptor, target: &Path) {
    let Some(bundler) = ctx.bundler.as_ref() else {
        return;
    };
    let bundler = Arc::clone(bundler);
    let entry = bundle::entry_name(&descriptor.url, &descriptor.filename);
    let path = target.to_path_buf();
    let result =
        tokio::task::spawn_blocking(move || bundler.add_file(&path, &entry)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(url = %descriptor.url, error = %e, "bundle append failed");
            ctx.metrics.record_bundle_error();
        }
        Err(e) => {
            warn!(url = %descriptor.url, error = %e, "bundle task failed");
            ctx.metrics.record_bundle_error();
        }
    }
}
