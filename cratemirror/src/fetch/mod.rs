//! Concurrent fetch engine: descriptors, HTTP client, retries, workers,
//! and the orchestrating engine.
//!
//! # Flow per descriptor
//!
//! ```text
//! queued ──► in-flight ──► done-ok | done-skipped | done-error
//! ```
//!
//! Only terminal transitions produce manifest records, and every descriptor
//! reaches exactly one of them.

mod client;
mod descriptor;
mod engine;
mod retry;
mod worker;

pub use client::{build_client, default_concurrency, USER_AGENT};
pub use descriptor::{crate_name_from_url, sanitize_filename, FetchDescriptor};
pub use engine::{EngineConfig, MirrorEngine, MirrorSummary};
pub use retry::{classify_status, classify_transport, FailureKind, RetryPolicy};
