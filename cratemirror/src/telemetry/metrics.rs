//! Atomic counter hub shared by all fetch workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::MetricsSnapshot;

/// Monotonic counters for a mirroring run.
///
/// All counters use relaxed atomics; the hub is a statistics aggregate, not
/// a synchronization point. Requires a target with native 64-bit atomics.
#[derive(Debug)]
pub struct MirrorMetrics {
    processed: AtomicU64,
    ok: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    retries: AtomicU64,
    bytes: AtomicU64,
    in_flight: AtomicU64,
    bundle_errors: AtomicU64,
    started_at: Instant,
}

impl MirrorMetrics {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            ok: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            bundle_errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Records one fully processed descriptor; returns the new total.
    pub fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records a successful download of `bytes` bytes.
    pub fn record_ok(&self, bytes: u64) {
        self.ok.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a failed descriptor.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a descriptor skipped by the resume check.
    pub fn record_skipped(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one retry attempt.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a bundler failure (the fetch itself stays successful).
    pub fn record_bundle_error(&self) {
        self.bundle_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks an HTTP request as started.
    pub fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks an HTTP request as finished.
    pub fn request_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started_at.elapsed();
        let processed = self.processed.load(Ordering::Relaxed);
        let rate_per_sec = if elapsed.as_secs_f64() > 0.0 {
            processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        MetricsSnapshot {
            processed,
            ok: self.ok.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            bundle_errors: self.bundle_errors.load(Ordering::Relaxed),
            elapsed,
            rate_per_sec,
        }
    }
}

impl Default for MirrorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
