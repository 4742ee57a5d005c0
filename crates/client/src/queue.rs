//! FIFO task queue with a bounded number of concurrently executing tasks.
//!
//! Dispatch uses a fixed pool of long-lived worker tasks pulling from a
//! channel, so long queues never grow the call stack. Tasks begin in
//! submission order; completion order is unspecified when more than one
//! worker is running. A task that fails completes as failed and the queue
//! keeps draining.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::debug;

use crate::DEFAULT_MAX_CONCURRENT;
use crate::error::ClientError;

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send>>;

struct QueueTask {
    fut: TaskFuture,
    done: oneshot::Sender<Result<(), ClientError>>,
}

/// Bounded-concurrency FIFO queue of request tasks.
///
/// Dropping the queue closes the channel; workers finish the tasks they
/// hold, drain nothing further, and exit.
#[derive(Debug)]
pub struct BoundedQueue {
    tx: mpsc::UnboundedSender<QueueTask>,
    max_concurrent: usize,
}

impl BoundedQueue {
    /// Creates a queue with `max_concurrent` worker tasks.
    ///
    /// Fails with [`ClientError::InvalidConfig`] if `max_concurrent < 1`.
    /// Must be called within a Tokio runtime.
    pub fn new(max_concurrent: usize) -> Result<Self, ClientError> {
        if max_concurrent < 1 {
            return Err(ClientError::InvalidConfig(format!(
                "max_concurrent must be >= 1, got {max_concurrent}"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel::<QueueTask>();
        // Single shared receiver: the channel is the one owner of pending
        // order, workers take the head one at a time.
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..max_concurrent {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    let Some(task) = task else { break };

                    let result = task.fut.await;
                    if let Err(ref e) = result {
                        debug!(worker, error = %e, "queued task failed");
                    }
                    // Receiver may have given up waiting; the task still
                    // counts as settled.
                    let _ = task.done.send(result);
                }
            });
        }

        Ok(Self { tx, max_concurrent })
    }

    /// Creates a queue with the default bound of 3 workers.
    pub fn with_default_bound() -> Result<Self, ClientError> {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }

    /// Appends a task and returns a future resolving when it settles.
    ///
    /// The returned future yields [`ClientError::QueueClosed`] if the queue
    /// shuts down before the task runs.
    pub fn enqueue<F>(&self, fut: F) -> impl Future<Output = Result<(), ClientError>> + use<F>
    where
        F: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let accepted = self
            .tx
            .send(QueueTask {
                fut: Box::pin(fut),
                done: done_tx,
            })
            .is_ok();

        async move {
            if !accepted {
                return Err(ClientError::QueueClosed);
            }
            done_rx.await.map_err(|_| ClientError::QueueClosed)?
        }
    }

    /// The concurrency bound fixed at construction.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
