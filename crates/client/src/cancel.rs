//! Registry mapping caller-supplied ids to live cancellation tokens.
//!
//! An entry lives from registration until the owning request settles or is
//! cancelled, whichever happens first. Cancelling an unknown id is a
//! deliberate no-op: the request may have completed and unregistered itself
//! concurrently with the cancel call.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ClientError;

/// Process-local registry of cancellation tokens, keyed by request id.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token under `id`.
    ///
    /// Fails with [`ClientError::DuplicateCancelId`] if `id` is already
    /// registered; ids are monotonic per key while an entry is live.
    pub fn register(&self, id: &str) -> Result<CancellationToken, ClientError> {
        let mut tokens = self.tokens.lock().unwrap();
        if tokens.contains_key(id) {
            return Err(ClientError::DuplicateCancelId(id.to_string()));
        }
        let token = CancellationToken::new();
        tokens.insert(id.to_string(), token.clone());
        Ok(token)
    }

    /// Cancels the operation registered under `id` and removes the entry.
    ///
    /// Unknown ids are ignored.
    pub fn cancel(&self, id: &str) {
        let removed = self.tokens.lock().unwrap().remove(id);
        match removed {
            Some(token) => {
                debug!(id, "cancelling request");
                token.cancel();
            }
            None => debug!(id, "cancel for unknown id ignored"),
        }
    }

    /// Removes the entry under `id` without cancelling. Idempotent.
    pub fn unregister(&self, id: &str) {
        self.tokens.lock().unwrap().remove(id);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    /// Returns `true` if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
