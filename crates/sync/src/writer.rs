use std::sync::Arc;

use storage::ObjectStore;
use sync_types::Mutation;
use tokio::sync::mpsc;

use crate::metrics;

/// The single consumer of the server-wide mutation queue.
///
/// Every accepted mutation from every object funnels through here before
/// its confirmation fans out, so the store sees writes in a single arrival
/// order and storage serialization stays off the fan-out path.
#[derive(Clone)]
pub struct Writer {
    tx: mpsc::Sender<Mutation>,
}

impl Writer {
    /// Spawn the persistence task. The handoff channel holds a single
    /// element, the closest bounded approximation of a rendezvous: a
    /// stalled store backpressures producers instead of queueing without
    /// limit.
    pub fn start(store: Arc<dyn ObjectStore>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(Self::go(store, rx));
        Self { tx }
    }

    async fn go(store: Arc<dyn ObjectStore>, mut rx: mpsc::Receiver<Mutation>) {
        while let Some(mutation) = rx.recv().await {
            // Subscribe-only frames carry no change to persist.
            if mutation.property_id.is_attach_marker() {
                continue;
            }
            if let Err(e) = store
                .add(&mutation.object_id, &mutation.property_id, mutation.data)
                .await
            {
                // Durability is best effort behind the live stream: log,
                // count, keep going.
                metrics::log_store_failure();
                tracing::error!(
                    "failed to persist {}/{}: {e:#}",
                    mutation.object_id,
                    mutation.property_id
                );
            }
        }
        tracing::debug!("writer queue closed, persistence task exiting");
    }

    /// Hand a mutation to the persistence task, waiting until it accepts.
    /// This is the primary backpressure point of the fan-out path.
    pub async fn submit(&self, mutation: Mutation) -> anyhow::Result<()> {
        self.tx
            .send(mutation)
            .await
            .map_err(|_| anyhow::anyhow!("writer task has shut down"))
    }
}
