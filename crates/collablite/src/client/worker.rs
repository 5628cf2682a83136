use std::{
    convert::Infallible,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use sync_types::{
    backoff::Backoff,
    Confirmation,
    Mutation,
};
use tokio::sync::{
    broadcast,
    mpsc,
};

use crate::{
    base_client::{
        BaseCollabClient,
        ReceiveOutcome,
    },
    client::{
        ObjectUpdate,
        UpdateKind,
    },
    sync::{
        ProtocolResponse,
        ReconnectProtocolReason,
        ReconnectRequest,
        SyncProtocol,
    },
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(15);

pub enum ClientRequest {
    /// Mutations already staged against the base client, ready for the
    /// wire.
    Send(Vec<Mutation>),
}

pub async fn worker<T: SyncProtocol>(
    mut protocol_response_receiver: mpsc::Receiver<ProtocolResponse>,
    mut client_request_receiver: mpsc::UnboundedReceiver<ClientRequest>,
    watch_sender: broadcast::Sender<ObjectUpdate>,
    base_client: Arc<Mutex<BaseCollabClient>>,
    mut protocol_manager: T,
) -> Infallible {
    let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);
    loop {
        let e = loop {
            match worker_once(
                &mut protocol_response_receiver,
                &mut client_request_receiver,
                &watch_sender,
                &base_client,
                &mut protocol_manager,
            )
            .await
            {
                Ok(()) => backoff.reset(),
                Err(e) => break e,
            }
        };

        let delay = backoff.fail(&mut rand::rng());
        tracing::error!(
            "CollabLite client worker failed: {e}. Backing off for {delay:?} and retrying."
        );
        tokio::time::sleep(delay).await;

        // Reconnect the transport, then immediately re-announce interest in
        // the current object on the fresh stream. Whatever was in flight
        // died with the old one, so the unconfirmed accounting restarts
        // too.
        protocol_manager
            .reconnect(ReconnectRequest { reason: e })
            .await;
        let reattach = base_client.lock().resend_attach();
        if let Some(marker) = reattach {
            let _ = protocol_manager.send(marker).await;
        }
    }
}

async fn worker_once<T: SyncProtocol>(
    protocol_response_receiver: &mut mpsc::Receiver<ProtocolResponse>,
    client_request_receiver: &mut mpsc::UnboundedReceiver<ClientRequest>,
    watch_sender: &broadcast::Sender<ObjectUpdate>,
    base_client: &Arc<Mutex<BaseCollabClient>>,
    protocol_manager: &mut T,
) -> Result<(), ReconnectProtocolReason> {
    tokio::select! {
        Some(protocol_response) = protocol_response_receiver.recv() => {
            handle_protocol_response(watch_sender, base_client, protocol_response)?;
        },
        Some(client_request) = client_request_receiver.recv() => {
            match client_request {
                ClientRequest::Send(mutations) => {
                    for mutation in mutations {
                        protocol_manager
                            .send(mutation)
                            .await
                            .map_err(|e| format!("failed to send mutation: {e}"))?;
                    }
                },
            }
        },
        // Both channels close only once the client handle is dropped, and
        // dropping the handle aborts this task.
        else => (),
    }
    Ok(())
}

fn handle_protocol_response(
    watch_sender: &broadcast::Sender<ObjectUpdate>,
    base_client: &Arc<Mutex<BaseCollabClient>>,
    protocol_response: ProtocolResponse,
) -> Result<(), ReconnectProtocolReason> {
    match protocol_response {
        ProtocolResponse::ServerMessage(confirmation) => {
            let outcome = base_client.lock().receive_confirmation(confirmation.clone());
            match outcome {
                ReceiveOutcome::RemoteUpdate => {
                    notify(watch_sender, UpdateKind::Remote, confirmation);
                },
                ReceiveOutcome::EchoConfirmed => {
                    notify(watch_sender, UpdateKind::Echo, confirmation);
                },
                ReceiveOutcome::ConflictDropped => {
                    tracing::debug!(
                        "dropping conflicting confirmation for {}/{}",
                        confirmation.object_id,
                        confirmation.property_id
                    );
                },
                ReceiveOutcome::ObjectMismatch => {
                    return Err(format!(
                        "confirmation for object {} does not match the attached object",
                        confirmation.object_id
                    ));
                },
            }
        },
        ProtocolResponse::Failure => {
            return Err("ProtocolFailure".into());
        },
    }
    Ok(())
}

fn notify(
    watch_sender: &broadcast::Sender<ObjectUpdate>,
    kind: UpdateKind,
    confirmation: Confirmation,
) {
    // Send errors just mean nobody is watching right now.
    let _ = watch_sender.send(ObjectUpdate { kind, confirmation });
}
