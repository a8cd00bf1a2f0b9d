//! Engine orchestration: queue, worker fan-out, result drain, shutdown.
//!
//! The engine owns the whole lifecycle of a run. A feeder task pushes
//! descriptors into a bounded queue (capacity 2x concurrency, so the feeder
//! blocks instead of buffering millions of entries); N workers share the
//! receiving end and exit when the queue is closed and drained; a single
//! collector writes manifest records in completion order and drives the
//! count-based progress reporter. One cancellation token fans out to every
//! suspension point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::client;
use super::descriptor::FetchDescriptor;
use super::retry::RetryPolicy;
use super::worker::{fetch_one, WorkerContext};
use crate::bundle::Bundler;
use crate::manifest::{FetchRecord, ManifestWriter};
use crate::telemetry::MirrorMetrics;
use crate::EngineError;

/// Tunables for a mirroring run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the sharded artifact tree.
    pub out_dir: PathBuf,
    /// Number of concurrent fetch workers.
    pub concurrency: usize,
    /// Per-attempt HTTP timeout; retries reset it.
    pub request_timeout: Duration,
    /// Retry budget and backoff shape.
    pub retry: RetryPolicy,
    /// Log progress after every N processed records; 0 disables.
    pub progress_every: u64,
    /// Emit periodic progress at this interval; `None` disables.
    pub progress_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            concurrency: client::default_concurrency(),
            request_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            progress_every: 0,
            progress_interval: None,
        }
    }
}

/// Final tallies of a completed run.
#[derive(Debug, Clone)]
pub struct MirrorSummary {
    pub total: u64,
    pub ok: u64,
    pub errors: u64,
    pub skipped: u64,
    pub elapsed: Duration,
}

/// The concurrent mirroring engine.
pub struct MirrorEngine {
    config: EngineConfig,
    client: reqwest::Client,
    metrics: Arc<MirrorMetrics>,
    manifest: Arc<ManifestWriter>,
    bundler: Option<Arc<Bundler>>,
}

impl MirrorEngine {
    /// Builds the engine and its shared HTTP client.
    pub fn new(
        config: EngineConfig,
        manifest: ManifestWriter,
        bundler: Option<Bundler>,
    ) -> Result<Self, EngineError> {
        let client = client::build_client(config.concurrency)?;
        Ok(Self {
            config,
            client,
            metrics: Arc::new(MirrorMetrics::new()),
            manifest: Arc::new(manifest),
            bundler: bundler.map(Arc::new),
        })
    }

    /// The shared metrics hub, for external observers.
    pub fn metrics(&self) -> Arc<MirrorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs the engine over a descriptor set until every descriptor has
    /// produced a manifest record or `cancel` fires.
    ///
    /// Per-descriptor failures are recorded and do not abort the run; only
    /// fatal conditions (output directory, manifest) return an error.
    pub async fn run(
        &self,
        descriptors: Vec<FetchDescriptor>,
        cancel: CancellationToken,
    ) -> Result<MirrorSummary, EngineError> {
        let started = Instant::now();
        tokio::fs::create_dir_all(&self.config.out_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: self.config.out_dir.clone(),
                source,
            })?;

        let concurrency = self.config.concurrency.max(1);
        info!(
            descriptors = descriptors.len(),
            concurrency,
            out = %self.config.out_dir.display(),
            "starting mirror run"
        );

        let (queue_tx, queue_rx) = mpsc::channel::<FetchDescriptor>(concurrency * 2);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<FetchRecord>(concurrency);

        // Feeder: blocks when the queue is full, closes it when done.
        let feeder_cancel = cancel.clone();
        let feeder = tokio::spawn(async move {
            for descriptor in descriptors {
                tokio::select! {
                    sent = queue_tx.send(descriptor) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    _ = feeder_cancel.cancelled() => break,
                }
            }
            // queue_tx drops here; recv() starts returning None once drained
        });

        // Workers: pull until the queue closes, one record per descriptor.
        let mut workers = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let queue_rx = Arc::clone(&queue_rx);
            let result_tx = result_tx.clone();
            let ctx = WorkerContext {
                client: self.client.clone(),
                out_dir: self.config.out_dir.clone(),
                retry: self.config.retry.clone(),
                request_timeout: self.config.request_timeout,
                metrics: Arc::clone(&self.metrics),
                bundler: self.bundler.clone(),
                cancel: cancel.clone(),
            };
            workers.push(tokio::spawn(async move {
                loop {
                    let descriptor = { queue_rx.lock().await.recv().await };
                    let Some(descriptor) = descriptor else { break };
                    let record = fetch_one(&ctx, &descriptor).await;
                    if result_tx.send(record).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let reporter = self.spawn_interval_reporter(started, cancel.clone());

        // Collector: the only writer into the manifest.
        while let Some(record) = result_rx.recv().await {
            if let Err(e) = self.manifest.write(&record) {
                error!(error = %e, "manifest write failed");
            }
            let processed = self.metrics.record_processed();
            if self.config.progress_every > 0 && processed % self.config.progress_every == 0 {
                let snap = self.metrics.snapshot();
                info!(
                    processed = snap.processed,
                    ok = snap.ok,
                    err = snap.errors,
                    "progress"
                );
            }
        }

        for worker in workers {
            let _ = worker.await;
        }
        let _ = feeder.await;
        if let Some(reporter) = reporter {
            reporter.abort();
        }

        if let Some(bundler) = self.bundler.as_ref() {
            let bundler = Arc::clone(bundler);
            let closed = tokio::task::spawn_blocking(move || bundler.close()).await;
            match closed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "bundle close failed"),
                Err(e) => error!(error = %e, "bundle close task failed"),
            }
        }
        if let Err(e) = self.manifest.close() {
            error!(error = %e, "manifest close failed");
        }

        let snap = self.metrics.snapshot();
        let summary = MirrorSummary {
            total: snap.processed,
            ok: snap.ok,
            errors: snap.errors,
            skipped: snap.skipped,
            elapsed: started.elapsed(),
        };
        info!(
            total = summary.total,
            ok = summary.ok,
            err = summary.errors,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "done"
        );
        Ok(summary)
    }

    /// Periodic progress reporter; quiet while nothing advances.
    fn spawn_interval_reporter(
        &self,
        started: Instant,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.progress_interval?;
        let metrics = Arc::clone(&self.metrics);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = cancel.cancelled() => return,
                }
                let snap = metrics.snapshot();
                if snap.processed == last {
                    continue;
                }
                last = snap.processed;
                let elapsed = started.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 {
                    snap.processed as f64 / elapsed
                } else {
                    0.0
                };
                info!(
                    processed = snap.processed,
                    ok = snap.ok,
                    err = snap.errors,
                    in_flight = snap.in_flight,
                    rate_per_sec = format!("{rate:.1}"),
                    "progress"
                );
            }
        }))
    }
}
