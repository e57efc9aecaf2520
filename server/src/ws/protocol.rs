use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::relay::{Delivery, RelayEngine, Session};

/// Keep-alive request sent by clients as a bare text frame.
pub const PING: &str = "ping";

/// Keep-alive reply.
pub const PONG: &str = "pong";

/// Decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Ping,
    Init {
        id: String,
    },
    Text {
        id: String,
        text: String,
        to: Option<String>,
    },
}

/// JSON shape of the identity-bearing client frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "mtype", rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientFrame {
    Init {
        id: String,
    },
    Text {
        id: String,
        text: String,
        #[serde(default)]
        to: Option<String>,
    },
}

impl From<ClientFrame> for InboundEvent {
    fn from(frame: ClientFrame) -> Self {
        match frame {
            ClientFrame::Init { id } => Self::Init { id },
            ClientFrame::Text { id, text, to } => Self::Text { id, text, to },
        }
    }
}

/// Event pushed from the relay to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mtype", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    UserEnter { id: String },
    UserLeave { id: String },
    Msg { id: String, text: String },
    Dm { id: String, text: String },
}

impl ServerEvent {
    /// Encode as a JSON text frame.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}

/// Decode one text frame. Unknown `mtype` values and missing fields are
/// reported as `Malformed`.
pub fn decode_text(data: &str) -> Result<InboundEvent, ProtocolError> {
    if data == PING {
        return Ok(InboundEvent::Ping);
    }
    let frame: ClientFrame = serde_json::from_str(data)?;
    Ok(frame.into())
}

/// Handle an incoming text frame: decode it and dispatch into the engine.
/// Undecodable frames are logged and dropped; the connection stays open.
pub async fn handle_text_message(
    data: &str,
    session: &mut Session,
    engine: &RelayEngine,
) -> Delivery {
    match decode_text(data) {
        Ok(event) => engine.handle_event(session, event).await,
        Err(e) => {
            tracing::warn!(
                connection_id = session.connection().id(),
                error = %e,
                "Dropping undecodable frame: {}",
                data.chars().take(100).collect::<String>()
            );
            engine.reject(session, &e.to_string())
        }
    }
}

/// Binary frames carry nothing in this protocol.
pub fn handle_binary_message(session: &Session, engine: &RelayEngine) -> Delivery {
    let e = ProtocolError::Binary;
    tracing::debug!(
        connection_id = session.connection().id(),
        "Received binary frame (expected JSON text)"
    );
    engine.reject(session, &e.to_string())
}
