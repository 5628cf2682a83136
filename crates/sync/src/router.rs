use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use sync_types::{
    ClientId,
    Confirmation,
    Mutation,
    ObjectId,
};
use tokio::sync::{
    mpsc,
    mpsc::error::SendTimeoutError,
};

use crate::{
    metrics,
    writer::Writer,
};

/// Queue sizing and drop policy for the router.
#[derive(Clone, Debug)]
pub struct RouterOptions {
    /// Capacity of each object's inbound mutation queue.
    pub inbound_queue_size: usize,
    /// Capacity of each subscriber's outbound confirmation queue.
    pub outbound_queue_size: usize,
    /// How long the fan-out waits on a full outbound queue before dropping
    /// that confirmation for that subscriber.
    pub fanout_drop_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            inbound_queue_size: 10_000,
            outbound_queue_size: 10_000,
            fanout_drop_timeout: Duration::from_millis(10),
        }
    }
}

/// Per-object subscription registry and fan-out ownership.
///
/// Each live object has one inbound mutation queue, one fan-out worker
/// consuming it, and one outbound queue per subscribed client. Objects are
/// created lazily on first subscribe and torn down when the last subscriber
/// leaves; closing the inbound queue is what stops the worker.
#[derive(Clone)]
pub struct ObjectRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    objects: RwLock<HashMap<ObjectId, ObjectChannels>>,
    writer: Writer,
    options: RouterOptions,
    live_workers: AtomicUsize,
}

struct ObjectChannels {
    inbound_tx: mpsc::Sender<Mutation>,
    subscribers: HashMap<ClientId, mpsc::Sender<Confirmation>>,
}

impl ObjectRouter {
    pub fn new(writer: Writer, options: RouterOptions) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                objects: RwLock::new(HashMap::new()),
                writer,
                options,
                live_workers: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe `client_id` to `object_id`, creating the object's channels
    /// and fan-out worker if this is its first subscriber.
    ///
    /// Returns the object's shared inbound queue and a fresh outbound queue
    /// for this client. Registering a pair that is already present is legal
    /// and replaces the client's outbound queue, which keeps transient
    /// stream churn from erroring.
    pub fn register_subscriber(
        &self,
        client_id: &ClientId,
        object_id: &ObjectId,
    ) -> (mpsc::Sender<Mutation>, mpsc::Receiver<Confirmation>) {
        let mut objects = self.inner.objects.write();
        let channels = objects.entry(object_id.clone()).or_insert_with(|| {
            let (inbound_tx, inbound_rx) = mpsc::channel(self.inner.options.inbound_queue_size);
            tracing::debug!("starting fan-out worker for object {object_id}");
            tokio::spawn(fan_out_worker(
                object_id.clone(),
                inbound_rx,
                self.inner.clone(),
            ));
            ObjectChannels {
                inbound_tx,
                subscribers: HashMap::new(),
            }
        });

        tracing::debug!("registering client {client_id} against object {object_id}");
        let (outbound_tx, outbound_rx) = mpsc::channel(self.inner.options.outbound_queue_size);
        if channels
            .subscribers
            .insert(client_id.clone(), outbound_tx)
            .is_some()
        {
            tracing::warn!(
                "client {client_id} was already subscribed to object {object_id}, replacing its \
                 outbound queue"
            );
        }
        (channels.inbound_tx.clone(), outbound_rx)
    }

    /// Drop `client_id`'s subscription to `object_id`, closing its outbound
    /// queue. When the subscriber map empties the object entry is removed,
    /// which closes the inbound queue and lets the fan-out worker drain and
    /// exit.
    pub fn unregister_subscriber(&self, client_id: &ClientId, object_id: &ObjectId) {
        let mut objects = self.inner.objects.write();
        let Some(channels) = objects.get_mut(object_id) else {
            return;
        };
        tracing::debug!("unregistering client {client_id} from object {object_id}");
        channels.subscribers.remove(client_id);
        if channels.subscribers.is_empty() {
            objects.remove(object_id);
        }
    }

    /// Number of objects with at least one subscriber.
    pub fn object_count(&self) -> usize {
        self.inner.objects.read().len()
    }

    /// Number of clients currently subscribed to `object_id`. Zero once the
    /// object has been torn down.
    pub fn subscriber_count(&self, object_id: &ObjectId) -> usize {
        self.inner
            .objects
            .read()
            .get(object_id)
            .map_or(0, |channels| channels.subscribers.len())
    }

    /// Number of fan-out workers currently running. Trails `object_count`
    /// briefly around creation and teardown.
    pub fn live_worker_count(&self) -> usize {
        self.inner.live_workers.load(Ordering::SeqCst)
    }
}

/// One per live object: applies that object's mutations in arrival order
/// and distributes confirmations.
async fn fan_out_worker(
    object_id: ObjectId,
    mut inbound_rx: mpsc::Receiver<Mutation>,
    inner: Arc<RouterInner>,
) {
    inner.live_workers.fetch_add(1, Ordering::SeqCst);
    metrics::log_fanout_worker_start();

    while let Some(mutation) = inbound_rx.recv().await {
        // Subscribe-only frames register interest and nothing else.
        if mutation.property_id.is_attach_marker() {
            continue;
        }

        // Hand off to the writer before fanning out, so every delivered
        // confirmation corresponds to a mutation the writer has accepted.
        if let Err(e) = inner.writer.submit(mutation.clone()).await {
            tracing::error!("writer rejected mutation for object {object_id}: {e:#}");
        }

        let confirmation = Confirmation::from(mutation);

        // Snapshot the subscriber set, then send outside the lock.
        let targets: Vec<(ClientId, mpsc::Sender<Confirmation>)> = {
            let objects = inner.objects.read();
            match objects.get(&object_id) {
                Some(channels) => channels
                    .subscribers
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        for (client_id, outbound_tx) in targets {
            match outbound_tx
                .send_timeout(confirmation.clone(), inner.options.fanout_drop_timeout)
                .await
            {
                Ok(()) => {},
                Err(SendTimeoutError::Timeout(_)) => {
                    metrics::log_confirmation_dropped();
                    tracing::warn!(
                        "client {client_id} is not draining confirmations for object \
                         {object_id}, dropping"
                    );
                },
                // The subscriber unregistered between the snapshot and the
                // send.
                Err(SendTimeoutError::Closed(_)) => {},
            }
        }
    }

    metrics::log_fanout_worker_stop();
    inner.live_workers.fetch_sub(1, Ordering::SeqCst);
    tracing::debug!("fan-out worker for object {object_id} exited");
}
