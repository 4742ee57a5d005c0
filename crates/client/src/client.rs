//! Verb-level request facade.
//!
//! The single entry point consumed by callers: `get`/`post`/`put`/`delete`
//! with optional per-request cancellation, chunked file upload, and the
//! polling session. Owns the cancel registry and at most one live polling
//! session at a time.

use std::sync::{Arc, Mutex};

use holdfast_transport::{Method, Request, RequestConfig, Response, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::CancelRegistry;
use crate::error::ClientError;
use crate::polling::{self, PollingEvent, PollingOptions};
use crate::upload::{ChunkSource, ChunkUploadSession, UploadOptions, UploadReport};

/// Resilient HTTP client facade over an abstract [`Transport`].
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    cancels: CancelRegistry,
    /// Stop token for the live polling session, if any.
    polling: Mutex<Option<CancellationToken>>,
}

/// Removes a registry entry when the request settles, even if the caller
/// drops the request future mid-flight.
struct UnregisterGuard<'a> {
    registry: &'a CancelRegistry,
    id: Option<String>,
}

impl Drop for UnregisterGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = &self.id {
            self.registry.unregister(id);
        }
    }
}

impl HttpClient {
    /// Creates a client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cancels: CancelRegistry::new(),
            polling: Mutex::new(None),
        }
    }

    /// Performs a GET request.
    pub async fn get(
        &self,
        url: &str,
        config: Option<RequestConfig>,
    ) -> Result<Response, ClientError> {
        self.dispatch(Method::Get, url, None, config).await
    }

    /// Performs a POST request.
    pub async fn post(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        config: Option<RequestConfig>,
    ) -> Result<Response, ClientError> {
        self.dispatch(Method::Post, url, body, config).await
    }

    /// Performs a PUT request.
    pub async fn put(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        config: Option<RequestConfig>,
    ) -> Result<Response, ClientError> {
        self.dispatch(Method::Put, url, body, config).await
    }

    /// Performs a DELETE request.
    pub async fn delete(
        &self,
        url: &str,
        config: Option<RequestConfig>,
    ) -> Result<Response, ClientError> {
        self.dispatch(Method::Delete, url, None, config).await
    }

    /// Cancels the in-flight request registered under `id`.
    ///
    /// Silent no-op if `id` is unknown or the request already settled.
    pub fn cancel_request(&self, id: &str) {
        self.cancels.cancel(id);
    }

    /// Uploads `source` to `url` in 5 MiB chunks with default options,
    /// bounded by `max_concurrent` in-flight chunks.
    pub async fn upload_file(
        &self,
        url: &str,
        source: ChunkSource,
        max_concurrent: Option<usize>,
    ) -> Result<UploadReport, ClientError> {
        let mut options = UploadOptions::default();
        if let Some(bound) = max_concurrent {
            options.max_concurrent = bound;
        }
        self.upload_file_with(url, source, options).await
    }

    /// Uploads `source` to `url` with explicit options.
    pub async fn upload_file_with(
        &self,
        url: &str,
        source: ChunkSource,
        options: UploadOptions,
    ) -> Result<UploadReport, ClientError> {
        let session = ChunkUploadSession::new(Arc::clone(&self.transport), options)?;
        session.upload(url, source).await
    }

    /// Starts polling `url`, replacing any session already running.
    ///
    /// Returns the session's event stream; dropping it does not stop the
    /// session, only [`stop_polling`](Self::stop_polling) (or starting a
    /// new session) does. A `cancel_id` in `config` is stripped: polling
    /// requests are never registered, the session is its own cancel scope.
    pub fn polling(
        &self,
        url: &str,
        config: Option<RequestConfig>,
        options: PollingOptions,
    ) -> mpsc::Receiver<PollingEvent> {
        let mut config = config.unwrap_or_default();
        if config.cancel_id.take().is_some() {
            debug!(url, "cancel_id has no effect on a polling session");
        }

        let (stop, events) = polling::spawn(
            Arc::clone(&self.transport),
            url.to_string(),
            config,
            options,
        );

        let mut slot = self.polling.lock().unwrap();
        // One live session at a time: clear the previous one before arming.
        if let Some(previous) = slot.replace(stop) {
            debug!("replacing active polling session");
            previous.cancel();
        }
        events
    }

    /// Stops the live polling session. No-op when none is running.
    pub fn stop_polling(&self) {
        if let Some(stop) = self.polling.lock().unwrap().take() {
            stop.cancel();
        }
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        config: Option<RequestConfig>,
    ) -> Result<Response, ClientError> {
        let config = config.unwrap_or_default();
        let cancel_id = config.cancel_id.clone();

        let token = match &cancel_id {
            Some(id) => Some(self.cancels.register(id)?),
            None => None,
        };
        let _guard = UnregisterGuard {
            registry: &self.cancels,
            id: cancel_id,
        };

        let mut request = Request::new(method, url).with_config(config);
        if let Some(body) = body {
            request = request.with_body(body);
        }

        match self.transport.send(request, token).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_aborted() => Err(ClientError::Cancelled),
            Err(e) => Err(ClientError::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_transport::TransportError;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Mock transport: records requests, optionally waits for its cancel
    /// token so cancellation paths can be exercised.
    struct MockTransport {
        requests: std::sync::Mutex<Vec<Request>>,
        hang_until_cancelled: bool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                requests: std::sync::Mutex::new(Vec::new()),
                hang_until_cancelled: false,
            }
        }

        fn hanging() -> Self {
            Self {
                requests: std::sync::Mutex::new(Vec::new()),
                hang_until_cancelled: true,
            }
        }

        fn recorded(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn send(
            &self,
            req: Request,
            cancel: Option<CancellationToken>,
        ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>> {
            self.requests.lock().unwrap().push(req);
            Box::pin(async move {
                if self.hang_until_cancelled {
                    match cancel {
                        Some(token) => {
                            token.cancelled().await;
                            return Err(TransportError::Aborted);
                        }
                        None => std::future::pending::<()>().await,
                    }
                }
                Ok(Response {
                    status: 200,
                    headers: HashMap::new(),
                    body: b"ok".to_vec(),
                })
            })
        }
    }

    fn client_over(transport: &Arc<MockTransport>) -> HttpClient {
        HttpClient::new(Arc::clone(transport) as Arc<dyn Transport>)
    }

    #[tokio::test]
    async fn verbs_reach_the_transport() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);

        client.get("https://example.test/a", None).await.unwrap();
        client
            .post("https://example.test/b", Some(b"data".to_vec()), None)
            .await
            .unwrap();
        client
            .put("https://example.test/c", Some(b"data".to_vec()), None)
            .await
            .unwrap();
        client.delete("https://example.test/d", None).await.unwrap();

        let methods: Vec<Method> = transport.recorded().iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![Method::Get, Method::Post, Method::Put, Method::Delete]
        );
    }

    #[tokio::test]
    async fn cancel_id_registers_then_unregisters() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);

        let config = RequestConfig::default().with_cancel_id("req-1");
        client
            .get("https://example.test/a", Some(config))
            .await
            .unwrap();

        // Entry removed once the request settled.
        assert!(client.cancels.is_empty());
        // The id can be reused for the next request.
        let config = RequestConfig::default().with_cancel_id("req-1");
        client
            .get("https://example.test/a", Some(config))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_cancel_id_rejected_while_in_flight() {
        let transport = Arc::new(MockTransport::hanging());
        let client = Arc::new(client_over(&transport));

        let in_flight = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let config = RequestConfig::default().with_cancel_id("req-1");
                client.get("https://example.test/a", Some(config)).await
            })
        };
        // Wait until the first request has registered.
        while client.cancels.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let config = RequestConfig::default().with_cancel_id("req-1");
        let err = client
            .get("https://example.test/b", Some(config))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::DuplicateCancelId(_)));

        client.cancel_request("req-1");
        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_request_aborts_in_flight_call() {
        let transport = Arc::new(MockTransport::hanging());
        let client = Arc::new(client_over(&transport));

        let in_flight = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let config = RequestConfig::default().with_cancel_id("req-9");
                client.get("https://example.test/slow", Some(config)).await
            })
        };
        while client.cancels.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        client.cancel_request("req-9");
        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert!(client.cancels.is_empty());
    }

    #[tokio::test]
    async fn cancel_request_unknown_id_is_silent() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);
        // Must not panic or error.
        client.cancel_request("never-registered");
    }

    #[tokio::test(start_paused = true)]
    async fn upload_file_via_facade() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);

        let report = client
            .upload_file(
                "https://example.test/upload",
                ChunkSource::from_bytes(vec![1u8; 64]),
                Some(2),
            )
            .await
            .unwrap();

        // 64 bytes fit in one default-size chunk.
        assert_eq!(report.total_chunks, 1);
        assert!(report.is_complete());
        assert_eq!(transport.recorded().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_polling_session_replaces_previous() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);

        let _first = client.polling("https://example.test/status", None, PollingOptions::default());
        let first_stop = client.polling.lock().unwrap().clone().unwrap();

        let _second =
            client.polling("https://example.test/status", None, PollingOptions::default());
        assert!(first_stop.is_cancelled());

        client.stop_polling();
        assert!(client.polling.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_strips_cancel_id() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);

        let config = RequestConfig::default().with_cancel_id("poll-1");
        let _events = client.polling(
            "https://example.test/status",
            Some(config),
            PollingOptions::default(),
        );
        // Let the first cycle fire.
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(client.cancels.is_empty());
        let requests = transport.recorded();
        assert!(!requests.is_empty());
        assert!(requests[0].config.cancel_id.is_none());
        client.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_polling_without_session_is_a_no_op() {
        let transport = Arc::new(MockTransport::new());
        let client = client_over(&transport);
        client.stop_polling();
    }
}
