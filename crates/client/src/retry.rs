//! Bounded retry with a fixed inter-attempt delay.
//!
//! Attempt numbering starts at 0; a retry is allowed while
//! `attempt < max_retries`, so the default budget of 3 retries yields at
//! most 4 total tries. Cancellation is terminal: it is observed before each
//! attempt, during the attempt, and during the delay, and is never retried.

use std::time::Duration;

use holdfast_transport::TransportError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ClientError;
use crate::{MAX_RETRIES, RETRY_DELAY};

/// Retry budget and delay for one logical operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Fixed wait between a failure and the next attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Drives `op` to success, cancellation, or retry exhaustion.
    ///
    /// `op` receives the 0-based attempt number. The delay suspends only
    /// this logical task; sibling tasks proceed independently. A transport
    /// call that reports [`TransportError::Aborted`] maps to
    /// [`ClientError::Cancelled`] and is never retried.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = op(attempt) => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_aborted() => return Err(ClientError::Cancelled),
                Err(e) => e,
            };

            if attempt >= self.max_retries {
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt + 1,
                    source: error,
                });
            }

            warn!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                error = %error,
                "attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
            attempt += 1;
        }
    }
}
