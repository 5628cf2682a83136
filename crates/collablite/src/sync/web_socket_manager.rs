use async_trait::async_trait;
use futures::{
    SinkExt,
    StreamExt,
};
use sync_types::{
    Confirmation,
    Mutation,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
};
use url::Url;

use crate::sync::{
    ProtocolResponse,
    ReconnectRequest,
    SyncProtocol,
};

enum WsCommand {
    Send(Mutation),
    Reconnect(ReconnectRequest),
}

/// [`SyncProtocol`] over a WebSocket.
///
/// The socket lives on its own task; this handle just forwards commands.
/// Transport trouble is reported upward as [`ProtocolResponse::Failure`]
/// and the manager then idles until the client worker, which owns backoff,
/// asks for a reconnect.
pub struct WebSocketManager {
    command_tx: mpsc::UnboundedSender<WsCommand>,
}

#[async_trait]
impl SyncProtocol for WebSocketManager {
    async fn open(
        ws_url: Url,
        on_response: mpsc::Sender<ProtocolResponse>,
    ) -> anyhow::Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let worker = WebSocketWorker {
            ws_url,
            on_response,
            command_rx,
        };
        tokio::spawn(worker.go());
        Ok(Self { command_tx })
    }

    async fn send(&mut self, message: Mutation) -> anyhow::Result<()> {
        self.command_tx
            .send(WsCommand::Send(message))
            .map_err(|_| anyhow::anyhow!("websocket task has shut down"))
    }

    async fn reconnect(&mut self, request: ReconnectRequest) {
        let _ = self.command_tx.send(WsCommand::Reconnect(request));
    }
}

struct WebSocketWorker {
    ws_url: Url,
    on_response: mpsc::Sender<ProtocolResponse>,
    command_rx: mpsc::UnboundedReceiver<WsCommand>,
}

impl WebSocketWorker {
    async fn go(mut self) {
        'connect: loop {
            let mut socket = match connect_async(self.ws_url.as_str()).await {
                Ok((socket, _response)) => socket,
                Err(e) => {
                    tracing::warn!("websocket connect to {} failed: {e}", self.ws_url);
                    if !self.fail_and_await_reconnect().await {
                        return;
                    }
                    continue 'connect;
                },
            };
            tracing::debug!("websocket connected to {}", self.ws_url);

            loop {
                tokio::select! {
                    maybe_command = self.command_rx.recv() => {
                        match maybe_command {
                            // The client handle is gone; close politely.
                            None => {
                                let _ = socket.close(None).await;
                                return;
                            },
                            Some(WsCommand::Send(mutation)) => {
                                let frame = match serde_json::to_string(&mutation) {
                                    Ok(frame) => frame,
                                    Err(e) => {
                                        tracing::error!("failed to encode mutation: {e}");
                                        continue;
                                    },
                                };
                                if let Err(e) = socket.send(Message::Text(frame.into())).await {
                                    tracing::warn!("websocket send failed: {e}");
                                    if !self.fail_and_await_reconnect().await {
                                        return;
                                    }
                                    continue 'connect;
                                }
                            },
                            Some(WsCommand::Reconnect(request)) => {
                                tracing::info!("reconnecting websocket: {}", request.reason);
                                let _ = socket.close(None).await;
                                continue 'connect;
                            },
                        }
                    },
                    maybe_frame = socket.next() => {
                        match maybe_frame {
                            Some(Ok(Message::Text(frame))) => {
                                match serde_json::from_str::<Confirmation>(frame.as_str()) {
                                    Ok(confirmation) => {
                                        let response =
                                            ProtocolResponse::ServerMessage(confirmation);
                                        if self.on_response.send(response).await.is_err() {
                                            return;
                                        }
                                    },
                                    Err(e) => {
                                        tracing::warn!("discarding malformed frame: {e}");
                                    },
                                }
                            },
                            // Tungstenite answers pings on its own.
                            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {},
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::warn!("websocket closed by server");
                                if !self.fail_and_await_reconnect().await {
                                    return;
                                }
                                continue 'connect;
                            },
                            Some(Ok(_)) => {},
                            Some(Err(e)) => {
                                tracing::warn!("websocket receive failed: {e}");
                                if !self.fail_and_await_reconnect().await {
                                    return;
                                }
                                continue 'connect;
                            },
                        }
                    },
                }
            }
        }
    }

    /// Surface a transport failure, then wait for the worker's reconnect
    /// request. Returns false when the client has gone away instead.
    async fn fail_and_await_reconnect(&mut self) -> bool {
        if self.on_response.send(ProtocolResponse::Failure).await.is_err() {
            return false;
        }
        while let Some(command) = self.command_rx.recv().await {
            match command {
                WsCommand::Reconnect(request) => {
                    tracing::info!("reconnecting websocket: {}", request.reason);
                    return true;
                },
                // Nothing to put it on; the failure has already been
                // surfaced.
                WsCommand::Send(_) => {},
            }
        }
        false
    }
}
