//! Run-wide counters for observability and progress reporting.
//!
//! Workers record events into lock-free atomic counters; reporters read
//! point-in-time snapshots. Nothing here ever blocks a fetch.
//!
//! ```text
//! Fetch Workers ─────► MirrorMetrics ─────► MetricsSnapshot ─────► reporters
//!                      (atomic counters)    (point-in-time copy)
//! ```

mod metrics;
mod snapshot;

pub use metrics::MirrorMetrics;
pub use snapshot::MetricsSnapshot;
