pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use tokio::sync::mpsc;

pub use registry::{Connection, ConnectionId, Registry};

/// Sender half of a connection's outbound queue.
/// The writer task owns the receiver and forwards each message to the socket.
pub type ConnectionSender = mpsc::Sender<axum::extract::ws::Message>;

/// Receiver half of a connection's outbound queue.
pub type ConnectionReceiver = mpsc::Receiver<axum::extract::ws::Message>;

/// Create a bounded outbound queue for one connection.
pub fn outbound_channel(capacity: usize) -> (ConnectionSender, ConnectionReceiver) {
    mpsc::channel(capacity.max(1))
}
