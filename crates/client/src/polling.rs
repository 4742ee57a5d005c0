//! Self-re-arming polling loop with a per-cycle retry budget.
//!
//! Each cycle performs one GET. Success re-arms the loop after the polling
//! interval with the attempt counter reset to 0. Failure retries the same
//! cycle after the fixed retry delay (independent of the interval) while
//! `attempt < max_retries`; exhausting the budget is terminal for the
//! session. The stop token is observed before every re-arm and retry, so a
//! stopped session never fires a late cycle.

use std::sync::Arc;
use std::time::Duration;

use holdfast_transport::{Method, Request, RequestConfig, Transport};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{MAX_RETRIES, POLLING_INTERVAL, RETRY_DELAY};

/// Tunables for one polling session.
#[derive(Debug, Clone, Copy)]
pub struct PollingOptions {
    /// Wait between successful cycles.
    pub interval: Duration,
    /// Retries allowed within one cycle before the session goes idle.
    pub max_retries: u32,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            interval: POLLING_INTERVAL,
            max_retries: MAX_RETRIES,
        }
    }
}

/// Outcomes emitted by a polling session.
///
/// Replaces per-call success/error callbacks; dropping the receiver does
/// not stop the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollingEvent {
    /// A cycle completed; the loop re-arms after the interval.
    CycleCompleted { status: u16 },
    /// An attempt within the current cycle failed; `attempt` is 0-based.
    CycleFailed { attempt: u32 },
    /// The cycle exhausted its retry budget; the session is now idle.
    Exhausted { attempts: u32 },
}

/// Spawns the polling loop and returns its stop token and event stream.
pub(crate) fn spawn(
    transport: Arc<dyn Transport>,
    url: String,
    config: RequestConfig,
    options: PollingOptions,
) -> (CancellationToken, mpsc::Receiver<PollingEvent>) {
    let stop = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(64);

    let loop_stop = stop.clone();
    tokio::spawn(async move {
        run_loop(transport, url, config, options, loop_stop, events_tx).await;
    });

    (stop, events_rx)
}

async fn run_loop(
    transport: Arc<dyn Transport>,
    url: String,
    config: RequestConfig,
    options: PollingOptions,
    stop: CancellationToken,
    events_tx: mpsc::Sender<PollingEvent>,
) {
    let mut attempt: u32 = 0;

    loop {
        if stop.is_cancelled() {
            debug!(url = %url, "polling stopped");
            return;
        }

        let request = Request::new(Method::Get, &url).with_config(config.clone());
        let result = tokio::select! {
            _ = stop.cancelled() => return,
            result = transport.send(request, Some(stop.child_token())) => result,
        };

        match result {
            Ok(response) => {
                debug!(url = %url, status = response.status, "polling cycle completed");
                let _ = events_tx
                    .send(PollingEvent::CycleCompleted {
                        status: response.status,
                    })
                    .await;
                attempt = 0;

                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(options.interval) => {}
                }
            }
            Err(e) if e.is_aborted() => return,
            Err(e) => {
                if attempt >= options.max_retries {
                    error!(
                        url = %url,
                        attempts = attempt + 1,
                        error = %e,
                        "polling failed, session going idle"
                    );
                    let _ = events_tx
                        .send(PollingEvent::Exhausted {
                            attempts: attempt + 1,
                        })
                        .await;
                    return;
                }

                warn!(url = %url, attempt, error = %e, "polling attempt failed, retrying");
                let _ = events_tx.send(PollingEvent::CycleFailed { attempt }).await;

                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
                attempt += 1;
            }
        }
    }
}
