//! Legacy HTTP+SSE endpoint discovery: some older servers don't return the
//! POST endpoint directly but instead open a long-lived GET SSE stream whose
//! first event (`event: endpoint`) carries the relative URL the client
//! should POST subsequent requests to, with `sessionId` in its query string.
//!
//! This is a single connection attempt with no auto-reconnect: the spec's
//! Non-goal on stateful SSE resumption under reconnect rules out a retry
//! loop here, matching the teacher's `sse_connection_task` minus its
//! `RetryPolicy`.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use mcp_transport_traits::{SseError, SseParser, TransportError};

use crate::session::SessionState;

/// Per-event size cap for the legacy stream, per spec §4.3.
const LEGACY_EVENT_SIZE_CAP: usize = 1024 * 1024;

pub(crate) async fn legacy_sse_reader(
    response: reqwest::Response,
    state: Arc<SyncMutex<SessionState>>,
    msg_tx: mpsc::Sender<Vec<u8>>,
    err_tx: mpsc::Sender<TransportError>,
    shutdown: CancellationToken,
    base_url: Url,
    ready: Arc<Notify>,
) {
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut ready_fired = false;

    loop {
        let chunk = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };

        let Some(chunk) = chunk else {
            break;
        };

        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = err_tx.send(TransportError::ReceiveFailed(e.to_string())).await;
                break;
            }
        };

        let events = match parser.push(&bytes) {
            Ok(events) => events,
            Err(SseError::EventTooLarge(_)) => {
                let _ = err_tx
                    .send(TransportError::ResponseTooLarge {
                        size: LEGACY_EVENT_SIZE_CAP + 1,
                        max: LEGACY_EVENT_SIZE_CAP,
                    })
                    .await;
                break;
            }
        };

        for event in events {
            if let Some(id) = event.id {
                state.lock().last_event_id = Some(id);
            }

            match event.event.as_deref() {
                Some("endpoint") => {
                    if let Ok(resolved) = base_url.join(&event.data) {
                        let session_id = resolved
                            .query_pairs()
                            .find(|(k, _)| k == "sessionId")
                            .map(|(_, v)| v.into_owned());
                        let mut state = state.lock();
                        state.endpoint_url = Some(event.data.clone());
                        if let Some(session_id) = session_id {
                            state.session_id = Some(session_id);
                        }
                        debug!(endpoint = %event.data, "discovered legacy SSE endpoint");
                    } else {
                        warn!(data = %event.data, "legacy endpoint event carried an unparseable URL");
                    }
                    if !ready_fired {
                        ready_fired = true;
                        ready.notify_one();
                    }
                }
                Some("message") | None => {
                    if !event.data.is_empty() {
                        if msg_tx.send(event.data.into_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }

    if !ready_fired {
        // The stream ended without ever sending an endpoint event; unblock
        // the caller waiting on `connect_legacy_sse` rather than hanging it.
        ready.notify_one();
    }
}
