use std::time::{
    Duration,
    Instant,
};

use axum::{
    body::Bytes,
    extract::{
        ws::{
            Message,
            WebSocket,
            WebSocketUpgrade,
        },
        State,
    },
    http::{
        HeaderMap,
        StatusCode,
    },
    response::{
        IntoResponse,
        Response,
    },
};
use futures::{
    try_join,
    SinkExt,
    StreamExt,
};
use parking_lot::Mutex;
use sync::SessionWorker;
use sync_types::Mutation;
use tokio::sync::mpsc;

mod metrics;

use metrics::{
    log_attach_websockets_total,
    log_websocket_client_timeout,
    log_websocket_connection_reset,
    log_websocket_message_in,
    log_websocket_message_out,
    log_websocket_ping,
};

use crate::LocalAppState;

/// How often heartbeat pings are sent.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);
/// Buffer between the session worker and the socket writer. Small on
/// purpose: a stalled socket must back up into the router's bounded
/// outbound queue, where the drop policy lives.
const SERVER_SEND_BUFFER: usize = 128;

/// Tracker that exists for the lifetime of a run_attach_socket.
struct AttachSocketDropToken {}

impl AttachSocketDropToken {
    fn new() -> Self {
        log_attach_websockets_total(1);
        AttachSocketDropToken {}
    }
}

impl Drop for AttachSocketDropToken {
    fn drop(&mut self) {
        log_attach_websockets_total(-1);
    }
}

/// The WebSocket endpoint carrying Mutation frames client → server and
/// Confirmation frames server → client.
///
/// Clients may announce their initial object of interest in an
/// `x-object-id` header; an empty value is rejected outright. Either way
/// the authoritative attach is the first Mutation's object id.
pub async fn attach(
    State(st): State<LocalAppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(value) = headers.get("x-object-id") {
        if value.is_empty() {
            return (StatusCode::BAD_REQUEST, "empty x-object-id").into_response();
        }
    }
    ws.on_upgrade(move |socket| run_attach_socket(st, socket))
}

// The WebSocket layer has three asynchronous processes:
//
// 1) A `receive_messages` loop that consumes frames from the WebSocket,
// parses them, and feeds them on a channel to the session worker.
// 2) A `send_messages` loop that receives confirmations from the session
// worker and writes them to the client. It also periodically sends a ping.
// 3) The `SessionWorker` that actually talks to the object router.
//
// If any of these fails we close the WebSocket with an error; they can
// also signal clean shutdown by returning `Ok(())`, and once all of them
// have exited the socket is dropped gracefully.
async fn run_attach_socket(st: LocalAppState, socket: WebSocket) {
    let _drop_token = AttachSocketDropToken::new();

    let (mut tx, mut rx) = socket.split();
    let last_received = Mutex::new(Instant::now());

    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let receive_messages = async {
        while let Some(message_r) = rx.next().await {
            let message = match message_r {
                Ok(message) => message,
                Err(e) => {
                    log_websocket_connection_reset();
                    return Err(anyhow::anyhow!(e).context("websocket receive failed"));
                },
            };
            *last_received.lock() = Instant::now();

            match message {
                Message::Text(frame) => {
                    let mutation: Mutation = serde_json::from_str(frame.as_str())
                        .map_err(|e| anyhow::anyhow!("invalid mutation frame: {e}"))?;
                    log_websocket_message_in();
                    if client_tx.send(mutation).is_err() {
                        break;
                    }
                },
                // The WebSocket library answers pings on its own.
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => break,
                Message::Binary(_) => {
                    anyhow::bail!("unexpected binary frame");
                },
            }
        }
        // Dropping our sender shuts the session worker down cleanly.
        drop(client_tx);
        Ok(())
    };

    let (server_tx, mut server_rx) = mpsc::channel(SERVER_SEND_BUFFER);
    let send_messages = async {
        let mut ping_ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        'top: loop {
            tokio::select! {
                _ = ping_ticker.tick() => {
                    if last_received.lock().elapsed() > CLIENT_TIMEOUT {
                        log_websocket_client_timeout();
                        return Err(anyhow::anyhow!("websocket ping timeout"));
                    }
                    log_websocket_ping();
                    if tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break 'top;
                    }
                },
                maybe_confirmation = server_rx.recv() => {
                    let Some(confirmation) = maybe_confirmation else {
                        break 'top;
                    };
                    log_websocket_message_out();
                    let serialized = serde_json::to_string(&confirmation)?;
                    if tx.send(Message::Text(serialized.into())).await.is_err() {
                        break 'top;
                    }
                },
            }
        }
        Ok(())
    };

    let session = async {
        let worker = SessionWorker::new(st.router.clone(), client_rx, server_tx);
        let client_id = worker.client_id().clone();
        tracing::debug!("new client connected as {client_id}");
        let r = worker.go().await;
        tracing::debug!("client {client_id} disconnected");
        // Dropping the worker (and with it the confirmation sender) lets
        // send_messages complete.
        r
    };

    let result = try_join!(receive_messages, send_messages, session);

    if let Err(e) = result {
        tracing::warn!("attach socket closed with error: {e:#}");
        // Best effort: the peer may already be gone.
        let _ = tx.send(Message::Close(None)).await;
    }
}
