//! Transport boundary for the holdfast request manager.
//!
//! The client crate never performs a network call itself; it drives an
//! implementation of [`Transport`] and decides *when* and *how many times*
//! each call is made. Implementations map [`Request`] onto a real HTTP
//! client and must report an aborted call as [`TransportError::Aborted`]
//! so the caller can tell cancellation apart from transient failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Per-request configuration passed through to the transport.
///
/// `timeout` is enforced by the transport, not by the client layer.
/// `cancel_id` is consumed by the client layer to register a cancellation
/// handle; it is not forwarded on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_id: Option<String>,
}

impl RequestConfig {
    /// Returns a config with a single header set, keeping the rest default.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Returns a config carrying the given cancellation id.
    pub fn with_cancel_id(mut self, id: &str) -> Self {
        self.cancel_id = Some(id.to_string());
        self
    }
}

/// A fully described request. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<Vec<u8>>,
    pub config: RequestConfig,
}

impl Request {
    /// Creates a request with no body and default config.
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            body: None,
            config: RequestConfig::default(),
        }
    }

    /// Attaches a body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Replaces the config.
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }
}

/// Response returned by a transport on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<u8>,
}

impl Response {
    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

/// Errors produced by a transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The call was aborted through its cancellation token. Never retried.
    #[error("request aborted")]
    Aborted,

    /// The peer answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The call failed before a response arrived (DNS, connect, reset).
    #[error("connection error: {0}")]
    Connection(String),

    /// The response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns `true` if this error came from the request's own
    /// cancellation token rather than the network.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}

/// Abstract transport performing one HTTP exchange.
///
/// Object-safe via boxed futures so the client layer can hold
/// `Arc<dyn Transport>` and tests can substitute mocks.
pub trait Transport: Send + Sync {
    /// Performs the exchange described by `req`.
    ///
    /// When `cancel` is provided and fires mid-call, the implementation
    /// must give up at its next suspension point and return
    /// [`TransportError::Aborted`]. Bytes already sent are not rolled back.
    fn send(
        &self,
        req: Request,
        cancel: Option<CancellationToken>,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>>;
}
