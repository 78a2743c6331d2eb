//! Message router: presence broadcasts and targeted signal forwarding.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::registry::{ClientId, Outbox, Peer, Registry};
use crate::signal::{ClientMessage, ServerMessage, Signal};

/// Where the `sender` of a forwarded signal comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderPolicy {
    /// Use the registry id of the connection the signal arrived on.
    #[default]
    Stamp,
    /// Forward whatever `sender` the client put in the frame.
    TrustClient,
}

pub struct Relay {
    registry: Arc<Registry>,
    policy: SenderPolicy,
}

impl Relay {
    pub fn new(registry: Arc<Registry>, policy: SenderPolicy) -> Self {
        Relay { registry, policy }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Admits a new connection: greets it with its id and the current peers,
    /// then announces it to those peers.
    pub async fn connect(&self, outbox: Outbox) -> ClientId {
        let admission = self.registry.register(outbox).await;
        info!(
            "client {} connected ({} peers, color {})",
            admission.id,
            admission.peers.len(),
            admission.color
        );

        let joined = ServerMessage::UserJoined { id: admission.id.clone() };
        let failed = broadcast(&admission.peers, &joined);
        self.disconnect_all(failed).await;

        admission.id
    }

    /// Routes one inbound text frame from `from`. Never fails the connection.
    pub async fn dispatch(&self, from: &str, text: &str) {
        match ClientMessage::parse(text) {
            Ok(msg) => self.handle(from, msg).await,
            Err(e) => warn!("dropping malformed message from {}: {}", from, e),
        }
    }

    pub async fn handle(&self, from: &str, msg: ClientMessage) {
        match msg {
            ClientMessage::Signal(signal) => self.forward(from, signal).await,
            ClientMessage::Ping => {
                if let Some(outbox) = self.registry.find(from).await {
                    if outbox.deliver(from, ServerMessage::Pong).is_err() {
                        self.disconnect(from).await;
                    }
                }
            }
            ClientMessage::Unknown(kind) => {
                info!("ignoring unknown message type {:?} from {}", kind, from);
            }
        }
    }

    async fn forward(&self, from: &str, signal: Signal) {
        let sender = match self.policy {
            SenderPolicy::Stamp => {
                if signal.sender.as_str() != Some(from) {
                    warn!(
                        "client {} claimed sender {} on {}, stamping real id",
                        from,
                        signal.sender,
                        signal.kind.as_str()
                    );
                }
                from.to_owned()
            }
            SenderPolicy::TrustClient => signal.claimed_sender(),
        };

        let Some(target) = signal.target_id() else {
            debug!(
                "dropping {} from {}: target {} is not a client id",
                signal.kind.as_str(),
                from,
                signal.target
            );
            return;
        };

        let Some(outbox) = self.registry.find(target).await else {
            debug!(
                "dropping {} from {}: target {} is not connected",
                signal.kind.as_str(),
                from,
                target
            );
            return;
        };

        let msg = ServerMessage::signal(signal.kind, sender, signal.data.clone());
        match outbox.deliver(target, msg) {
            Ok(()) => debug!("{} {} -> {}", signal.kind.as_str(), from, target),
            Err(e) => {
                debug!("forward failed: {}", e);
                self.disconnect(target).await;
            }
        }
    }

    /// Close path for `id`: unregister and tell everyone left. Safe to call
    /// more than once; only the first call announces anything.
    pub async fn disconnect(&self, id: &str) {
        self.disconnect_all(vec![id.to_owned()]).await;
    }

    // A failed write while announcing a departure closes that peer too, so
    // this works through a queue rather than recursing.
    async fn disconnect_all(&self, ids: Vec<ClientId>) {
        let mut pending: VecDeque<ClientId> = ids.into();

        while let Some(id) = pending.pop_front() {
            let Some(departure) = self.registry.unregister(&id).await else {
                continue;
            };
            info!(
                "client {} disconnected ({} remaining)",
                id,
                departure.remaining.len()
            );

            let left = ServerMessage::UserLeft { id };
            pending.extend(broadcast(&departure.remaining, &left));
        }
    }
}

// Queues `msg` on every peer and returns the ids whose writer is gone.
fn broadcast(peers: &[Peer], msg: &ServerMessage) -> Vec<ClientId> {
    peers
        .iter()
        .filter(|peer| peer.outbox.send(msg.clone()).is_err())
        .map(|peer| peer.id.clone())
        .collect()
}
