//! Client error types.

use holdfast_transport::TransportError;

/// Errors produced by the request manager.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Caller-initiated abort. Terminal, never retried.
    #[error("cancelled")]
    Cancelled,

    /// A transient failure outlived its retry budget.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cancellation id already registered: {0}")]
    DuplicateCancelId(String),

    /// First unrecoverable chunk under `FailurePolicy::AbortOnFailure`.
    #[error("chunk {index} upload failed: {source}")]
    ChunkUpload {
        index: u64,
        #[source]
        source: Box<ClientError>,
    },

    /// The queue shut down before the task settled.
    #[error("queue closed")]
    QueueClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns `true` for caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_converts() {
        let err: ClientError = TransportError::Status(503).into();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn retries_exhausted_keeps_last_error() {
        let err = ClientError::RetriesExhausted {
            attempts: 4,
            source: TransportError::Connection("reset".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("reset"));
    }

    #[test]
    fn chunk_upload_names_index() {
        let err = ClientError::ChunkUpload {
            index: 7,
            source: Box::new(ClientError::Cancelled),
        };
        assert!(err.to_string().contains("chunk 7"));
    }
}
