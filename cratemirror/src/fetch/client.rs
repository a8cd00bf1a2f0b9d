//! Shared HTTP client tuned for one-origin mass download.

use std::time::Duration;

use crate::EngineError;

/// Stable user-agent so the origin can identify (and rate-shape) the mirror.
pub const USER_AGENT: &str = concat!(
    "cratemirror/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/aptlantis/cratemirror)"
);

/// Idle connections are kept warm for this long; reconnect churn against a
/// single origin is the main latency cost at high concurrency.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the shared client for `concurrency` parallel workers.
///
/// HTTP/2 is negotiated via ALPN and multiplexes most fetches over a few
/// connections; the idle pool is sized at 4x concurrency so HTTP/1.1
/// fallback still keeps every worker supplied. Proxy settings are taken
/// from the environment. The per-attempt timeout is applied per request by
/// the worker, not here, so retries get a fresh deadline.
pub fn build_client(concurrency: usize) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(concurrency.saturating_mul(4))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(EngineError::HttpClient)
}

/// Aggressive yet safe default worker count for saturating one origin.
///
/// Fetches are I/O-bound; the floor of 64 keeps small machines busy and the
/// per-core multiplier scales for fat links.
pub fn default_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * 32).max(64)
}
