//! In-memory registry of connected clients.
//!
//! A single `RwLock` guards the map. Nothing awaits on network I/O while the
//! lock is held: outbound frames go onto each connection's unbounded queue and
//! the connection's writer task does the actual socket write.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::error::RelayError;
use crate::signal::ServerMessage;

pub type ClientId = String;

// 12 hex chars of a v4 uuid, 48 random bits
const ID_LEN: usize = 12;

const COLORS: [&str; 8] = [
    "#2196F3", "#32c787", "#00BCD4", "#ff5652", "#ffc107", "#ff85af", "#FF9800", "#39bbb0",
];

/// Sending half of a connection's writer queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Outbox { tx }
    }

    /// Fails once the writer side of the connection is gone.
    pub fn send(&self, msg: ServerMessage) -> Result<(), ServerMessage> {
        self.tx.send(msg).map_err(|e| e.0)
    }

    /// Like [`Outbox::send`] but reports the failure against `id`.
    pub fn deliver(&self, id: &str, msg: ServerMessage) -> Result<(), RelayError> {
        self.send(msg)
            .map_err(|_| RelayError::ConnectionClosed(id.to_owned()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub color: &'static str,
    pub outbox: Outbox,
    seq: u64,
}

/// A registered peer captured while the lock was held.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: ClientId,
    pub outbox: Outbox,
}

/// Result of [`Registry::register`]: the new id plus every client that was
/// already present at that instant (exactly the ids listed in its greeting).
#[derive(Debug)]
pub struct Admission {
    pub id: ClientId,
    pub color: &'static str,
    pub peers: Vec<Peer>,
}

/// Result of [`Registry::unregister`]: the removed client plus the clients
/// still registered at that instant.
#[derive(Debug)]
pub struct Departure {
    pub client: Client,
    pub remaining: Vec<Peer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub color: &'static str,
}

type IdGenerator = Box<dyn Fn() -> ClientId + Send + Sync>;

#[derive(Default)]
struct Inner {
    clients: HashMap<ClientId, Client>,
    next_seq: u64,
}

impl Inner {
    // join order
    fn peers(&self, excluding: &str) -> Vec<Peer> {
        let mut entries: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| c.id != excluding)
            .collect();
        entries.sort_by_key(|c| c.seq);
        entries
            .into_iter()
            .map(|c| Peer { id: c.id.clone(), outbox: c.outbox.clone() })
            .collect()
    }
}

pub struct Registry {
    inner: RwLock<Inner>,
    generate_id: IdGenerator,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_id_generator(random_id)
    }

    pub fn with_id_generator<F>(generate_id: F) -> Self
    where
        F: Fn() -> ClientId + Send + Sync + 'static,
    {
        Registry {
            inner: RwLock::new(Inner::default()),
            generate_id: Box::new(generate_id),
        }
    }

    /// Registers a new connection under a fresh id.
    ///
    /// The `connect` greeting is queued on `outbox` before the entry becomes
    /// visible, so it is always the first frame that client sees. Announcing
    /// the newcomer to `Admission::peers` is left to the caller.
    pub async fn register(&self, outbox: Outbox) -> Admission {
        let mut inner = self.inner.write().await;

        let id = loop {
            let candidate = (self.generate_id)();
            if !inner.clients.contains_key(&candidate) {
                break candidate;
            }
            warn!("generated client id {} is already live, regenerating", candidate);
        };

        let peers = inner.peers(&id);
        let greeting = ServerMessage::Connect {
            id: id.clone(),
            clients: peers.iter().map(|p| p.id.clone()).collect(),
        };
        // reader of this outbox is the caller's writer task, still alive here
        let _ = outbox.send(greeting);

        let color = pick_color();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.clients.insert(id.clone(), Client { id: id.clone(), color, outbox, seq });

        Admission { id, color, peers }
    }

    /// Removes `id`. Returns `None` if it was already gone.
    pub async fn unregister(&self, id: &str) -> Option<Departure> {
        let mut inner = self.inner.write().await;
        let client = inner.clients.remove(id)?;
        let remaining = inner.peers(id);
        Some(Departure { client, remaining })
    }

    pub async fn list_ids(&self, excluding: &str) -> Vec<ClientId> {
        let inner = self.inner.read().await;
        inner.peers(excluding).into_iter().map(|p| p.id).collect()
    }

    pub async fn find(&self, id: &str) -> Option<Outbox> {
        let inner = self.inner.read().await;
        inner.clients.get(id).map(|c| c.outbox.clone())
    }

    pub async fn clients(&self) -> Vec<ClientInfo> {
        let inner = self.inner.read().await;
        let mut clients: Vec<&Client> = inner.clients.values().collect();
        clients.sort_by_key(|c| c.seq);
        clients
            .into_iter()
            .map(|c| ClientInfo { id: c.id.clone(), color: c.color })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.clients.is_empty()
    }
}

fn random_id() -> ClientId {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

fn pick_color() -> &'static str {
    let bytes = Uuid::new_v4().into_bytes();
    COLORS[bytes[0] as usize % COLORS.len()]
}
