use sync_types::{
    ClientId,
    Confirmation,
    Mutation,
    ObjectId,
};
use tokio::sync::mpsc;

use crate::{
    metrics,
    router::ObjectRouter,
};

/// One per client stream.
///
/// The socket shell parses inbound frames onto `rx` and writes everything
/// on `tx` back out; this worker sits between them and the router. It
/// tracks which object the stream is attached to, forwards mutations into
/// that object's inbound queue (blocking there is what propagates
/// backpressure to the stream), and relays the object's confirmations.
pub struct SessionWorker {
    client_id: ClientId,
    router: ObjectRouter,
    rx: mpsc::UnboundedReceiver<Mutation>,
    /// Toward the socket writer. Deliberately small: when the stream stops
    /// draining, this fills, we stop consuming our outbound queue, and the
    /// fan-out's drop policy takes over.
    tx: mpsc::Sender<Confirmation>,
    current: Option<AttachedObject>,
}

struct AttachedObject {
    object_id: ObjectId,
    inbound_tx: mpsc::Sender<Mutation>,
    outbound_rx: mpsc::Receiver<Confirmation>,
}

impl SessionWorker {
    pub fn new(
        router: ObjectRouter,
        rx: mpsc::UnboundedReceiver<Mutation>,
        tx: mpsc::Sender<Confirmation>,
    ) -> Self {
        Self {
            client_id: ClientId::generate(),
            router,
            rx,
            tx,
            current: None,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Run until the stream hangs up or fails. Unregistration happens in
    /// Drop, so it also runs when the socket shell cancels this future
    /// mid-await.
    pub async fn go(mut self) -> anyhow::Result<()> {
        self.run().await
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                maybe_mutation = self.rx.recv() => {
                    match maybe_mutation {
                        Some(mutation) => self.handle_mutation(mutation).await?,
                        // End of stream: the socket reader dropped its
                        // sender. Exit cleanly.
                        None => return Ok(()),
                    }
                },
                maybe_confirmation = next_confirmation(&mut self.current) => {
                    match maybe_confirmation {
                        Some(confirmation) => {
                            metrics::log_confirmation_out();
                            if self.tx.send(confirmation).await.is_err() {
                                // Socket writer is gone; the receive side
                                // will observe the same shortly.
                                return Ok(());
                            }
                        },
                        // Our outbound queue closed underneath us: the
                        // router replaced this registration. Stop polling
                        // the stale queue.
                        None => self.current = None,
                    }
                },
            }
        }
    }

    async fn handle_mutation(&mut self, mutation: Mutation) -> anyhow::Result<()> {
        metrics::log_mutation_in();
        let same_object =
            matches!(&self.current, Some(attached) if attached.object_id == mutation.object_id);
        if !same_object {
            let object_id = mutation.object_id.clone();
            let (inbound_tx, outbound_rx) =
                self.router.register_subscriber(&self.client_id, &object_id);
            // Register the new object before releasing the old one, then
            // swap queues. Confirmations still queued for the previous
            // object are discarded with its outbound queue.
            if let Some(previous) = self.current.take() {
                self.router
                    .unregister_subscriber(&self.client_id, &previous.object_id);
            }
            self.current = Some(AttachedObject {
                object_id,
                inbound_tx,
                outbound_rx,
            });
        }
        if let Some(attached) = &self.current {
            attached
                .inbound_tx
                .send(mutation)
                .await
                .map_err(|_| anyhow::anyhow!("object router closed the inbound queue"))?;
        }
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(attached) = self.current.take() {
            self.router
                .unregister_subscriber(&self.client_id, &attached.object_id);
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn next_confirmation(current: &mut Option<AttachedObject>) -> Option<Confirmation> {
    match current {
        Some(attached) => attached.outbound_rx.recv().await,
        None => std::future::pending().await,
    }
}
