//! Point-in-time view of the metrics hub.

use std::time::Duration;

/// A consistent-enough copy of all counters at one instant.
///
/// Individual loads are relaxed, so a snapshot taken mid-update may be off
/// by in-flight increments; reporters only need trend-accurate numbers.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Descriptors fully processed (one manifest record each).
    pub processed: u64,
    /// Successful outcomes, including resume skips.
    pub ok: u64,
    /// Failed outcomes.
    pub errors: u64,
    /// Resume-check skips (subset of `ok`).
    pub skipped: u64,
    /// Retry attempts beyond first tries.
    pub retries: u64,
    /// Payload bytes written to disk.
    pub bytes: u64,
    /// HTTP requests currently in flight.
    pub in_flight: u64,
    /// Bundler failures (never fail the fetch).
    pub bundle_errors: u64,
    /// Time since the hub was created.
    pub elapsed: Duration,
    /// Processed records per second since start.
    pub rate_per_sec: f64,
}
