//! Resilient HTTP request manager.
//!
//! Orchestrates *when* and *how many times* a transport call is made:
//! bounded-concurrency dispatch, bounded retry with fixed delay,
//! per-request cancellation, chunked file upload with per-chunk retry, and
//! a self-re-arming polling loop. The wire protocol itself lives behind the
//! [`Transport`](holdfast_transport::Transport) trait.

use std::time::Duration;

mod cancel;
mod client;
mod error;
mod polling;
mod queue;
mod retry;
mod upload;

pub use cancel::CancelRegistry;
pub use client::HttpClient;
pub use error::ClientError;
pub use polling::{PollingEvent, PollingOptions};
pub use queue::BoundedQueue;
pub use retry::RetryPolicy;
pub use upload::{
    CHUNK_INDEX_HEADER, ChunkSource, ChunkUploadSession, FailurePolicy, TOTAL_CHUNKS_HEADER,
    UploadOptions, UploadReport,
};

/// Fixed upload chunk size: 5 MiB.
pub const CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default retries after the initial attempt.
pub const MAX_RETRIES: u32 = 3;

/// Fixed wait between a failed attempt and the next retry.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default wait between successful polling cycles.
pub const POLLING_INTERVAL: Duration = Duration::from_millis(5000);

/// Default bound on concurrently executing queue tasks.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
