use std::{
    convert::Infallible,
    sync::Arc,
};

use parking_lot::Mutex;
use sync_types::{
    ClientId,
    Confirmation,
    ObjectId,
    ObjectSnapshot,
};
use tokio::{
    sync::{
        broadcast,
        mpsc,
    },
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use url::Url;

use crate::{
    base_client::BaseCollabClient,
    client::worker::{
        worker,
        ClientRequest,
    },
    converters::Converter,
    sync::{
        web_socket_manager::WebSocketManager,
        SyncProtocol,
    },
};

pub(crate) mod worker;

const PROTOCOL_RESPONSE_BUFFER: usize = 128;
const WATCH_BUFFER: usize = 1024;

/// Whether an applied confirmation was someone else's write or the echo of
/// one of ours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    Remote,
    Echo,
}

/// A confirmation that survived the client's filter and was applied to the
/// mirror.
#[derive(Clone, Debug)]
pub struct ObjectUpdate {
    pub kind: UpdateKind,
    pub confirmation: Confirmation,
}

/// An asynchronous client for one CollabLite server.
///
/// The client holds a WebSocket connection and a [`tokio`] background task
/// that manages it. Attach to an object, push local edits through a
/// [`Converter`], and watch the applied updates flow back:
///
/// ```no_run
/// use std::collections::BTreeMap;
///
/// use collablite::{
///     converters::KeyValueConverter,
///     CollabClient,
/// };
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = CollabClient::new("http://127.0.0.1:8000").await?;
///     let object_id = "whiteboard".parse()?;
///     client.attach(object_id)?;
///
///     let mut updates = client.watch();
///     let mut doc = BTreeMap::from([("color".to_owned(), "red".into())]);
///     client.send(&KeyValueConverter, "whiteboard".parse()?, &doc)?;
///     while let Some(Ok(update)) = updates.next().await {
///         println!("{:?}", update.confirmation);
///         client.apply_to(&KeyValueConverter, &mut doc)?;
///     }
///     Ok(())
/// }
/// ```
///
/// Cloning shares the connection and the mirror; when the last clone is
/// dropped the connection is cleaned up.
pub struct CollabClient {
    listen_handle: Option<Arc<JoinHandle<Infallible>>>,
    request_sender: mpsc::UnboundedSender<ClientRequest>,
    watch_receiver: broadcast::Receiver<ObjectUpdate>,
    base_client: Arc<Mutex<BaseCollabClient>>,
    http_client: reqwest::Client,
    api_url: Url,
}

impl Clone for CollabClient {
    fn clone(&self) -> Self {
        Self {
            listen_handle: self.listen_handle.clone(),
            request_sender: self.request_sender.clone(),
            watch_receiver: self.watch_receiver.resubscribe(),
            base_client: self.base_client.clone(),
            http_client: self.http_client.clone(),
            api_url: self.api_url.clone(),
        }
    }
}

impl Drop for CollabClient {
    fn drop(&mut self) {
        if let Some(handle) = self.listen_handle.take() {
            if let Ok(handle) = Arc::try_unwrap(handle) {
                handle.abort();
            }
        }
    }
}

impl CollabClient {
    /// Connect to a deployment, e.g. `http://127.0.0.1:8000`. The WebSocket
    /// attaches at `/api/attach` and snapshots are fetched from
    /// `/api/object/{id}`.
    pub async fn new(deployment_url: &str) -> anyhow::Result<Self> {
        Self::with_protocol::<WebSocketManager>(deployment_url).await
    }

    pub(crate) async fn with_protocol<T: SyncProtocol + 'static>(
        deployment_url: &str,
    ) -> anyhow::Result<Self> {
        let (ws_url, api_url) = endpoint_urls(deployment_url)?;

        let (response_sender, response_receiver) = mpsc::channel(PROTOCOL_RESPONSE_BUFFER);
        let protocol = T::open(ws_url, response_sender).await?;

        let (request_sender, request_receiver) = mpsc::unbounded_channel();
        let (watch_sender, watch_receiver) = broadcast::channel(WATCH_BUFFER);
        let base_client = Arc::new(Mutex::new(BaseCollabClient::new()));

        let listen_handle = tokio::spawn(worker(
            response_receiver,
            request_receiver,
            watch_sender,
            base_client.clone(),
            protocol,
        ));
        Ok(Self {
            listen_handle: Some(Arc::new(listen_handle)),
            request_sender,
            watch_receiver,
            base_client,
            http_client: reqwest::Client::new(),
            api_url,
        })
    }

    /// This client's self-assigned origin identity.
    pub fn client_id(&self) -> ClientId {
        self.base_client.lock().client_id().clone()
    }

    /// Start watching `object_id`. Resets the local mirror; load current
    /// state with [`Self::get_object`] if you need it.
    pub fn attach(&self, object_id: ObjectId) -> anyhow::Result<()> {
        let marker = self.base_client.lock().attach(object_id);
        self.request_sender
            .send(ClientRequest::Send(vec![marker]))
            .map_err(|_| anyhow::anyhow!("client worker has stopped"))
    }

    /// Reconcile `doc` against the mirror and send a mutation for every
    /// property it changed. Attaches to `object_id` first if the client is
    /// watching something else.
    pub fn send<C: Converter>(
        &self,
        converter: &C,
        object_id: ObjectId,
        doc: &C::Doc,
    ) -> anyhow::Result<()> {
        let to_send = {
            let mut base_client = self.base_client.lock();
            let mut to_send = Vec::new();
            let attached = base_client
                .current_object()
                .is_some_and(|object| *object.object_id() == object_id);
            if !attached {
                to_send.push(base_client.attach(object_id.clone()));
            }
            // Reconcile against a copy so a converter error leaves the
            // mirror untouched.
            let existing = base_client.current_object().cloned();
            let object = converter.to_object(&object_id, existing, doc)?;
            to_send.extend(base_client.stage_object(object));
            to_send
        };
        if to_send.is_empty() {
            return Ok(());
        }
        self.request_sender
            .send(ClientRequest::Send(to_send))
            .map_err(|_| anyhow::anyhow!("client worker has stopped"))
    }

    /// Reflect server updates that arrived since the last call back into
    /// `doc`, consuming the per-property updated flags.
    pub fn apply_to<C: Converter>(&self, converter: &C, doc: &mut C::Doc) -> anyhow::Result<()> {
        let mut base_client = self.base_client.lock();
        let Some(object) = base_client.current_object_mut() else {
            return Ok(());
        };
        converter.from_object(object, doc)?;
        object.clear_updated_flags();
        Ok(())
    }

    /// Subscribe to the stream of confirmations applied to the mirror,
    /// both remote updates and echoes of our own sends.
    pub fn watch(&self) -> BroadcastStream<ObjectUpdate> {
        BroadcastStream::new(self.watch_receiver.resubscribe())
    }

    /// Fetch the full persisted state of an object. The way to seed local
    /// state after attaching, and to recover after the server drops
    /// confirmations for us as a slow consumer.
    pub async fn get_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectSnapshot> {
        let url = self.api_url.join(&format!("api/object/{object_id}"))?;
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Local mutations still awaiting their echo.
    pub fn unconfirmed_count(&self) -> usize {
        self.base_client.lock().unconfirmed_count()
    }

    /// Remote confirmations dropped because they raced an in-flight local
    /// write. Purely a statistic.
    pub fn conflict_count(&self) -> u64 {
        self.base_client.lock().conflict_count()
    }
}

/// Derive the WebSocket and HTTP endpoints from one deployment URL. Accepts
/// http(s) or ws(s) schemes.
fn endpoint_urls(deployment_url: &str) -> anyhow::Result<(Url, Url)> {
    let base: Url = deployment_url.parse()?;
    let mut ws_url = base.clone();
    let mut api_url = base;
    match ws_url.scheme() {
        "http" | "ws" => {
            let _ = ws_url.set_scheme("ws");
            let _ = api_url.set_scheme("http");
        },
        "https" | "wss" => {
            let _ = ws_url.set_scheme("wss");
            let _ = api_url.set_scheme("https");
        },
        scheme => anyhow::bail!("unsupported deployment url scheme {scheme}"),
    }
    let ws_url = ws_url.join("api/attach")?;
    Ok((ws_url, api_url))
}

#[cfg(test)]
mod tests {
    use super::endpoint_urls;

    #[test]
    fn test_endpoint_urls() -> anyhow::Result<()> {
        let (ws, api) = endpoint_urls("http://127.0.0.1:8000")?;
        assert_eq!(ws.as_str(), "ws://127.0.0.1:8000/api/attach");
        assert_eq!(api.as_str(), "http://127.0.0.1:8000/");

        let (ws, api) = endpoint_urls("https://collab.example.com")?;
        assert_eq!(ws.as_str(), "wss://collab.example.com/api/attach");
        assert_eq!(api.as_str(), "https://collab.example.com/");

        assert!(endpoint_urls("ftp://nope").is_err());
        Ok(())
    }
}
