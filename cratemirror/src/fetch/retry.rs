//! Retry classification and backoff scheduling for fetch attempts.

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient; schedule a backoff and try again.
    Retryable,
    /// Permanent for this descriptor; stop immediately.
    Fatal,
    /// The attempt deadline or the run cancellation fired; stop without
    /// further attempts.
    Cancelled,
}

/// Retry budget and backoff shape for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Base backoff, doubled per attempt.
    pub base: Duration,
    /// Cap applied before jitter.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following `attempt` (1-based): exponential
    /// with the base doubled per attempt, capped, then multiplied by a
    /// jitter factor in [0.5, 1.5).
    ///
    /// The jitter source is a cheap thread-local PRNG; independence across
    /// workers matters here, uniformity does not.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let raw = self.base.saturating_mul(1u32 << exp);
        let capped = raw.min(self.max);
        let jitter: f64 = rand::rng().random_range(0.5..1.5);
        capped.mul_f64(jitter)
    }
}

/// Classifies an HTTP response status.
///
/// 408, 425, 429 and all 5xx are transient server conditions; every other
/// non-2xx status is treated as permanent for the descriptor.
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_EARLY
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        FailureKind::Retryable
    } else {
        FailureKind::Fatal
    }
}

/// Classifies a transport-level error from the HTTP client.
///
/// Everything the network can do to us mid-request (DNS, connect, TLS,
/// reset, short read) is transient; only the per-attempt deadline stops the
/// retry loop.
pub fn classify_transport(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Cancelled
    } else {
        FailureKind::Retryable
    }
}
