/// Testing helpers for the protocol module.
use std::{
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use sync_types::{
    Confirmation,
    Mutation,
};
use tokio::sync::mpsc;
use url::Url;

use crate::sync::{
    ProtocolResponse,
    ReconnectRequest,
    SyncProtocol,
};

#[derive(Debug, Default)]
struct TestProtocolInner {
    sent_messages: Vec<Mutation>,
    reconnects: usize,
}

/// An in-process [`SyncProtocol`] that records what the worker sends and
/// lets tests inject server traffic.
#[derive(Clone)]
pub struct TestProtocol {
    inner: Arc<Mutex<TestProtocolInner>>,
    response_sender: mpsc::Sender<ProtocolResponse>,
}

impl TestProtocol {
    pub async fn fake_server_response(&self, confirmation: Confirmation) -> anyhow::Result<()> {
        self.response_sender
            .send(ProtocolResponse::ServerMessage(confirmation))
            .await?;
        Ok(())
    }

    pub async fn fake_failure(&self) -> anyhow::Result<()> {
        self.response_sender.send(ProtocolResponse::Failure).await?;
        Ok(())
    }

    pub async fn wait_until_n_messages_sent(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.inner.lock().sent_messages.len() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("test timed out waiting for messages to be sent");
    }

    pub fn take_sent(&self) -> Vec<Mutation> {
        std::mem::take(&mut self.inner.lock().sent_messages)
    }

    pub fn reconnect_count(&self) -> usize {
        self.inner.lock().reconnects
    }
}

#[async_trait]
impl SyncProtocol for TestProtocol {
    async fn open(
        _ws_url: Url,
        response_sender: mpsc::Sender<ProtocolResponse>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(TestProtocolInner::default())),
            response_sender,
        })
    }

    async fn send(&mut self, message: Mutation) -> anyhow::Result<()> {
        self.inner.lock().sent_messages.push(message);
        Ok(())
    }

    async fn reconnect(&mut self, _request: ReconnectRequest) {
        self.inner.lock().reconnects += 1;
    }
}
