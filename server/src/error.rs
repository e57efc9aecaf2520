//! Error types for the relay.
//!
//! None of these ever escape a single connection or a single send: the engine
//! maps each one to a logged, counted outcome and keeps going.

use thiserror::Error;

/// Failures scoped to one registry lookup or one outbound send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Directed send to an identity that is not registered.
    #[error("no connection registered for identity '{0}'")]
    UnknownRecipient(String),

    /// The outbound queue stayed full for longer than the send timeout.
    #[error("send to '{0}' timed out")]
    SendTimeout(String),

    /// The connection's writer has gone away.
    #[error("channel for '{0}' is closed")]
    ChannelClosed(String),

    /// The outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(String),
}

impl RelayError {
    /// Transport faults trigger leave handling for the affected identity.
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, Self::SendTimeout(_) | Self::ChannelClosed(_))
    }
}

/// Inbound frames that could not be turned into an event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("binary frames are not part of the protocol")]
    Binary,
}
