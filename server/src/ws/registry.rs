//! Connection registry: identity -> live connection bindings.
//!
//! Backed by a DashMap so every insert and removal is atomic per key.
//! Staleness is expected; closed channels are evicted lazily by `sweep_dead`.

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::watch;

use crate::error::RelayError;
use crate::ws::ConnectionSender;

/// Process-unique id of one accepted socket.
pub type ConnectionId = u64;

/// Handle to one live client channel.
///
/// Cloning is cheap; every clone pushes into the same outbound queue and
/// shares the same close signal.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: ConnectionSender,
    shutdown: Arc<watch::Sender<Option<CloseFrame>>>,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: ConnectionSender) -> Self {
        let (shutdown, _) = watch::channel(None);
        Self {
            id,
            tx,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True once the writer task has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a message, waiting at most `timeout` for space.
    pub async fn send(
        &self,
        identity: &str,
        msg: Message,
        timeout: Duration,
    ) -> Result<(), RelayError> {
        self.tx.send_timeout(msg, timeout).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => RelayError::SendTimeout(identity.to_string()),
            SendTimeoutError::Closed(_) => RelayError::ChannelClosed(identity.to_string()),
        })
    }

    /// Ask the writer to send a close frame and hang up.
    ///
    /// Travels beside the outbound queue, so a full queue cannot drop it.
    /// Returns false when no writer is listening for the signal.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        self.shutdown.send(Some(frame)).is_ok()
    }

    /// Receiver the writer task waits on for `close`.
    pub fn close_signal(&self) -> watch::Receiver<Option<CloseFrame>> {
        self.shutdown.subscribe()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: DashMap<String, Connection>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh outbound sender with a new connection id.
    pub fn connect(&self, tx: ConnectionSender) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Connection::new(id, tx)
    }

    /// Insert or overwrite the binding for `identity`.
    ///
    /// Returns the previous connection when a *different* connection held the
    /// slot, so the caller can close the orphaned session.
    pub fn register(&self, identity: &str, connection: Connection) -> Option<Connection> {
        let id = connection.id();
        let previous = self.connections.insert(identity.to_string(), connection);

        tracing::debug!(
            identity = %identity,
            connection_id = id,
            connections = self.connections.len(),
            "Connection registered"
        );

        previous.filter(|prev| prev.id() != id)
    }

    /// Remove the binding if present. Absent identities are not an error.
    ///
    /// Identity-only removal. The engine's leave paths use
    /// `unregister_connection` instead, so a session that was replaced can
    /// never evict its successor.
    pub fn unregister(&self, identity: &str) -> bool {
        self.connections.remove(identity).is_some()
    }

    /// Remove the binding only if it still belongs to `connection_id`.
    pub fn unregister_connection(&self, identity: &str, connection_id: ConnectionId) -> bool {
        self.connections
            .remove_if(identity, |_, conn| conn.id() == connection_id)
            .is_some()
    }

    pub fn lookup(&self, identity: &str) -> Result<Connection, RelayError> {
        self.connections
            .get(identity)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RelayError::UnknownRecipient(identity.to_string()))
    }

    /// Point-in-time copy, safe to iterate while the map keeps changing.
    pub fn snapshot(&self) -> Vec<(String, Connection)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Evict every binding whose channel reports closed.
    ///
    /// Returns the identities this call removed; an identity removed by a
    /// concurrent sweep is not reported twice.
    pub fn sweep_dead(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|(_, conn)| conn.is_closed())
            .filter(|(identity, conn)| self.unregister_connection(identity, conn.id()))
            .map(|(identity, _)| identity)
            .collect()
    }

    /// True when `identity` is currently bound to `connection_id`.
    pub fn is_bound(&self, identity: &str, connection_id: ConnectionId) -> bool {
        self.connections
            .get(identity)
            .is_some_and(|entry| entry.value().id() == connection_id)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.connections.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
