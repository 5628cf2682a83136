use async_trait::async_trait;
use sync_types::{
    Confirmation,
    Mutation,
};
use tokio::sync::mpsc;
use url::Url;

#[cfg(test)]
pub mod testing;
pub mod web_socket_manager;

/// Upon a protocol failure, an explanation of the failure to pass in on
/// reconnect.
#[derive(Debug)]
pub struct ReconnectRequest {
    pub reason: ReconnectProtocolReason,
}

pub type ReconnectProtocolReason = String;

#[derive(Debug)]
pub enum ProtocolResponse {
    ServerMessage(Confirmation),
    Failure,
}

/// The transport seam between the client worker and the wire.
///
/// The real implementation is [`web_socket_manager::WebSocketManager`];
/// tests substitute an in-process fake.
#[async_trait]
pub trait SyncProtocol: Send + Sized {
    async fn open(ws_url: Url, on_response: mpsc::Sender<ProtocolResponse>)
        -> anyhow::Result<Self>;
    async fn send(&mut self, message: Mutation) -> anyhow::Result<()>;
    async fn reconnect(&mut self, request: ReconnectRequest);
}
