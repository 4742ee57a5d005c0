//! Chunked file upload driven through the bounded queue with per-chunk
//! retry.
//!
//! The source is split into fixed-size chunks; every chunk is submitted up
//! front and the queue enforces the concurrency bound. Each chunk carries
//! its index and the total chunk count as headers, and runs under its own
//! retry budget. A chunk that exhausts retries is isolated: under
//! [`FailurePolicy::BestEffort`] the remaining chunks still settle and the
//! outcome lands in the [`UploadReport`]; under
//! [`FailurePolicy::AbortOnFailure`] the session cancels its remaining
//! chunks and surfaces the first unrecoverable one.

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use holdfast_transport::{Method, Request, RequestConfig, Transport};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;
use crate::queue::BoundedQueue;
use crate::retry::RetryPolicy;
use crate::{CHUNK_SIZE, DEFAULT_MAX_CONCURRENT};

/// Header carrying the 0-based chunk index.
pub const CHUNK_INDEX_HEADER: &str = "x-chunk-index";
/// Header carrying the total number of chunks in the upload.
pub const TOTAL_CHUNKS_HEADER: &str = "x-total-chunks";

/// Read-only byte source for a chunked upload.
///
/// File-backed sources are read per chunk on the blocking pool, so parallel
/// chunk tasks never contend on a shared file handle.
#[derive(Debug, Clone)]
pub enum ChunkSource {
    Memory(Arc<Vec<u8>>),
    File { path: PathBuf, len: u64 },
}

impl ChunkSource {
    /// Wraps an in-memory buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        ChunkSource::Memory(Arc::new(data.into()))
    }

    /// Opens a file source, capturing its current length.
    pub fn from_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let len = std::fs::metadata(&path)?.len();
        Ok(ChunkSource::File { path, len })
    }

    /// Total size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            ChunkSource::Memory(data) => data.len() as u64,
            ChunkSource::File { len, .. } => *len,
        }
    }

    /// Returns `true` for an empty source.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `size` bytes at `offset`.
    pub(crate) async fn read_chunk(&self, offset: u64, size: usize) -> Result<Vec<u8>, ClientError> {
        match self {
            ChunkSource::Memory(data) => {
                let start = offset as usize;
                Ok(data[start..start + size].to_vec())
            }
            ChunkSource::File { path, .. } => {
                let path = path.clone();
                let buf = tokio::task::spawn_blocking(move || {
                    let mut file = std::fs::File::open(&path)?;
                    file.seek(SeekFrom::Start(offset))?;
                    let mut buf = vec![0u8; size];
                    file.read_exact(&mut buf)?;
                    Ok::<_, std::io::Error>(buf)
                })
                .await
                .map_err(std::io::Error::other)??;
                Ok(buf)
            }
        }
    }
}

/// What to do when a chunk exhausts its retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure, keep uploading the remaining chunks, and report
    /// per-chunk outcomes. Matches the historical behavior of the layer.
    #[default]
    BestEffort,
    /// Cancel the remaining chunks and fail the upload with the first
    /// unrecoverable chunk.
    AbortOnFailure,
}

/// Tunables for one upload session.
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Fixed chunk size in bytes.
    pub chunk_size: usize,
    /// Concurrency bound for chunk tasks.
    pub max_concurrent: usize,
    /// Per-chunk retry budget.
    pub retry: RetryPolicy,
    /// Failure handling policy.
    pub policy: FailurePolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::default(),
            policy: FailurePolicy::default(),
        }
    }
}

/// Per-chunk terminal outcomes of an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReport {
    pub total_chunks: u64,
    pub succeeded: u64,
    /// Indices that exhausted their retry budget.
    pub failed: Vec<u64>,
    /// Indices cancelled before or during transfer.
    pub cancelled: Vec<u64>,
}

impl UploadReport {
    /// Returns `true` if every chunk succeeded.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total_chunks
    }
}

/// Drives one file-like byte source through the queue in fixed-size chunks.
pub struct ChunkUploadSession {
    transport: Arc<dyn Transport>,
    options: UploadOptions,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ChunkUploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkUploadSession").finish_non_exhaustive()
    }
}

impl ChunkUploadSession {
    /// Creates a session. Fails fast on a zero chunk size or concurrency
    /// bound.
    pub fn new(transport: Arc<dyn Transport>, options: UploadOptions) -> Result<Self, ClientError> {
        if options.chunk_size == 0 {
            return Err(ClientError::InvalidConfig(
                "chunk_size must be >= 1".into(),
            ));
        }
        if options.max_concurrent < 1 {
            return Err(ClientError::InvalidConfig(
                "max_concurrent must be >= 1".into(),
            ));
        }
        Ok(Self {
            transport,
            options,
            cancel: CancellationToken::new(),
        })
    }

    /// Token aborting the whole session; in-flight chunks observe it at
    /// their next suspension point.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `source` to `url` as `ceil(len / chunk_size)` POSTed chunks.
    ///
    /// All chunks are submitted up front; the queue bounds how many are in
    /// flight. Settlement is awaited in index order so the report is
    /// deterministic.
    pub async fn upload(&self, url: &str, source: ChunkSource) -> Result<UploadReport, ClientError> {
        let chunk_size = self.options.chunk_size as u64;
        let total_len = source.len();
        let total_chunks = total_len.div_ceil(chunk_size);

        let queue = BoundedQueue::new(self.options.max_concurrent)?;
        let source = Arc::new(source);

        debug!(url, total_chunks, total_len, "starting chunked upload");

        let mut completions = Vec::with_capacity(total_chunks as usize);
        for index in 0..total_chunks {
            let offset = index * chunk_size;
            let size = chunk_size.min(total_len - offset) as usize;

            let transport = Arc::clone(&self.transport);
            let source = Arc::clone(&source);
            let url = url.to_string();
            let retry = self.options.retry;
            let chunk_cancel = self.cancel.child_token();

            completions.push(queue.enqueue(async move {
                if chunk_cancel.is_cancelled() {
                    return Err(ClientError::Cancelled);
                }
                let data = source.read_chunk(offset, size).await?;
                let request = Request::new(Method::Post, &url).with_body(data).with_config(
                    RequestConfig::default()
                        .with_header(CHUNK_INDEX_HEADER, &index.to_string())
                        .with_header(TOTAL_CHUNKS_HEADER, &total_chunks.to_string()),
                );

                retry
                    .run(&chunk_cancel, |_attempt| {
                        transport.send(request.clone(), Some(chunk_cancel.child_token()))
                    })
                    .await
                    .map(|_response| ())
            }));
        }

        let mut report = UploadReport {
            total_chunks,
            ..Default::default()
        };
        let mut first_failure: Option<(u64, ClientError)> = None;

        for (index, completion) in completions.into_iter().enumerate() {
            let index = index as u64;
            match completion.await {
                Ok(()) => {
                    debug!(index, "chunk uploaded");
                    report.succeeded += 1;
                }
                Err(e) if e.is_cancelled() => {
                    warn!(index, "chunk upload cancelled");
                    report.cancelled.push(index);
                }
                Err(e) => {
                    error!(index, error = %e, "chunk upload failed");
                    report.failed.push(index);
                    if self.options.policy == FailurePolicy::AbortOnFailure
                        && first_failure.is_none()
                    {
                        // Stop the chunks that have not settled yet.
                        self.cancel.cancel();
                        first_failure = Some((index, e));
                    }
                }
            }
        }

        if let Some((index, source)) = first_failure {
            return Err(ClientError::ChunkUpload {
                index,
                source: Box::new(source),
            });
        }

        info!(
            total_chunks,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            "file upload process completed"
        );
        Ok(report)
    }
}
