//! Relay engine: turns decoded client events into registry mutations and
//! outbound fan-out.
//!
//! Leave handling (unregister + USER_LEAVE broadcast) is triggered from three
//! places: the liveness sweep, a failed send, and receive-loop termination.
//! All of them funnel into `announce_departures`, which works through a queue
//! instead of recursing, since announcing one departure can surface another.

mod session;
mod stats;

pub use session::Session;
pub use stats::{RelayStats, StatsSnapshot};

use axum::extract::ws::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::error::RelayError;
use crate::ws::broadcast::fan_out;
use crate::ws::protocol::{InboundEvent, ServerEvent, PONG};
use crate::ws::{ConnectionId, ConnectionSender, Registry};

/// Close code sent to a session whose identity was claimed by a newer INIT.
pub const CLOSE_IDENTITY_TAKEN: u16 = 4000;

/// What a handler did with one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// PONG queued to the originating connection.
    Pong,
    /// Identity bound; `replaced` is true when an older session was orphaned.
    Registered { replaced: bool },
    /// Fan-out reached this many recipients.
    Broadcast { recipients: usize },
    /// DM queued to its single recipient.
    Direct,
    /// DM target is not registered; message dropped.
    UnknownRecipient,
    /// DM target was registered but nothing was delivered: its send
    /// faulted (target evicted) or the event could not be encoded.
    Failed,
    /// Event refused (TEXT before INIT, spoofed sender, undecodable frame).
    Rejected,
}

pub struct RelayEngine {
    registry: Registry,
    stats: RelayStats,
    send_timeout: Duration,
}

impl RelayEngine {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            registry: Registry::new(),
            stats: RelayStats::default(),
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Start tracking a freshly accepted socket.
    pub fn open_session(&self, tx: ConnectionSender) -> Session {
        Session::new(self.registry.connect(tx))
    }

    pub async fn handle_event(&self, session: &mut Session, event: InboundEvent) -> Delivery {
        match event {
            InboundEvent::Ping => self.handle_ping(session).await,
            InboundEvent::Init { id } => self.handle_init(session, id).await,
            InboundEvent::Text { id, text, to } => self.handle_text(session, &id, text, to).await,
        }
    }

    /// Reply PONG to the sender only, then run a liveness sweep.
    pub async fn handle_ping(&self, session: &Session) -> Delivery {
        let conn = session.connection();
        let label = session.identity().unwrap_or("<anonymous>");
        if let Err(e) = conn
            .send(label, Message::Text(PONG.into()), self.send_timeout)
            .await
        {
            tracing::debug!(
                connection_id = conn.id(),
                error = %e,
                "Failed to queue pong"
            );
        }
        self.sweep().await;
        Delivery::Pong
    }

    /// Bind `identity` to this session and announce it to everyone else.
    pub async fn handle_init(&self, session: &mut Session, identity: String) -> Delivery {
        let conn = session.connection().clone();

        if let Some(previous) = session.identity().filter(|prev| *prev != identity) {
            let previous = previous.to_string();
            tracing::info!(
                connection_id = conn.id(),
                from = %previous,
                to = %identity,
                "Connection changed identity"
            );
            self.leave(&previous, conn.id()).await;
        }

        let replaced = self.registry.register(&identity, conn.clone());
        if let Some(orphan) = &replaced {
            tracing::info!(
                identity = %identity,
                connection_id = conn.id(),
                orphaned_connection_id = orphan.id(),
                "Identity taken over, closing previous session"
            );
            if orphan.close(CLOSE_IDENTITY_TAKEN, "identity taken over") {
                self.stats.record_orphan_closed();
            } else {
                tracing::debug!(
                    orphaned_connection_id = orphan.id(),
                    "Orphaned session already gone"
                );
            }
        }
        session.identify(identity.clone());

        tracing::info!(identity = %identity, connection_id = conn.id(), "User entered");
        let enter = ServerEvent::UserEnter {
            id: identity.clone(),
        };
        self.broadcast(&enter, Some(&identity)).await;

        Delivery::Registered {
            replaced: replaced.is_some(),
        }
    }

    /// Route a TEXT event: broadcast when `to` is absent, DM otherwise.
    pub async fn handle_text(
        &self,
        session: &Session,
        claimed: &str,
        text: String,
        to: Option<String>,
    ) -> Delivery {
        let Some(sender) = session.identity() else {
            return self.reject(session, "TEXT before INIT");
        };
        if sender != claimed {
            return self.reject(session, "TEXT sender does not match connection identity");
        }
        if !self.registry.is_bound(sender, session.connection().id()) {
            return self.reject(session, "session no longer owns its identity");
        }

        match to {
            None => {
                let event = ServerEvent::Msg {
                    id: sender.to_string(),
                    text,
                };
                let recipients = self.broadcast(&event, Some(sender)).await;
                Delivery::Broadcast { recipients }
            }
            Some(to) => {
                let event = ServerEvent::Dm {
                    id: sender.to_string(),
                    text,
                };
                let result = self.send_direct(&to, &event).await;
                self.direct_outcome(sender, &to, result)
            }
        }
    }

    fn direct_outcome(&self, from: &str, to: &str, result: Result<(), RelayError>) -> Delivery {
        match result {
            Ok(()) => Delivery::Direct,
            Err(RelayError::UnknownRecipient(_)) => {
                tracing::debug!(from = %from, to = %to, "DM to unknown recipient dropped");
                self.stats.record_unknown_recipient();
                Delivery::UnknownRecipient
            }
            Err(_) => Delivery::Failed,
        }
    }

    /// Receive loop ended. Leave handling runs only if this session still
    /// owns its identity's registry slot.
    pub async fn handle_disconnect(&self, session: &Session) -> bool {
        match session.identity() {
            Some(identity) => self.leave(identity, session.connection().id()).await,
            None => false,
        }
    }

    /// Count and log a refused event. The connection stays open.
    pub fn reject(&self, session: &Session, reason: &str) -> Delivery {
        tracing::warn!(
            connection_id = session.connection().id(),
            identity = session.identity().unwrap_or("<anonymous>"),
            reason = reason,
            "Rejected inbound event"
        );
        self.stats.record_rejected();
        Delivery::Rejected
    }

    /// Deliver `event` to one identity.
    ///
    /// A transport fault evicts the recipient (with USER_LEAVE) before the
    /// error is returned.
    pub async fn send_direct(&self, to: &str, event: &ServerEvent) -> Result<(), RelayError> {
        let conn = self.registry.lookup(to)?;
        let msg = event.to_message().map_err(|e| {
            tracing::error!(error = %e, "Failed to encode event");
            RelayError::Encode(e.to_string())
        })?;

        match conn.send(to, msg, self.send_timeout).await {
            Ok(()) => {
                self.stats.record_direct();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(identity = %to, connection_id = conn.id(), error = %e, "Direct send failed");
                self.leave(to, conn.id()).await;
                Err(e)
            }
        }
    }

    /// Sweep, then send `event` to every registered connection except
    /// `exclude`. Returns the number of recipients reached.
    pub async fn broadcast(&self, event: &ServerEvent, exclude: Option<&str>) -> usize {
        let msg = match event.to_message() {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode event");
                return 0;
            }
        };

        let mut departed = self.registry.sweep_dead();
        let outcome = fan_out(&self.registry, &msg, exclude, self.send_timeout).await;
        departed.extend(outcome.departed);
        self.stats.record_broadcast(outcome.delivered);

        self.announce_departures(departed).await;
        outcome.delivered
    }

    /// Evict every closed connection and announce each departure.
    /// Returns the number of identities evicted by this call.
    pub async fn sweep(&self) -> usize {
        let departed = self.registry.sweep_dead();
        let evicted = departed.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Liveness sweep evicted connections");
        }
        self.announce_departures(departed).await;
        evicted
    }

    async fn leave(&self, identity: &str, connection_id: ConnectionId) -> bool {
        if !self.registry.unregister_connection(identity, connection_id) {
            return false;
        }
        self.announce_departures(vec![identity.to_string()]).await;
        true
    }

    async fn announce_departures(&self, mut pending: Vec<String>) {
        while let Some(identity) = pending.pop() {
            self.stats.record_departure();
            tracing::info!(identity = %identity, "User left");

            let leave = ServerEvent::UserLeave { id: identity };
            let msg = match leave.to_message() {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode event");
                    continue;
                }
            };

            pending.extend(self.registry.sweep_dead());
            let outcome = fan_out(&self.registry, &msg, None, self.send_timeout).await;
            pending.extend(outcome.departed);
        }
    }
}

/// Run `sweep` on a fixed schedule so dead connections are noticed even when
/// no client is pinging.
pub fn spawn_sweeper(engine: Arc<RelayEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        // Skip the first immediate tick
        timer.tick().await;

        loop {
            timer.tick().await;
            engine.sweep().await;
        }
    })
}
