use crate::ws::Connection;

/// Per-connection protocol state.
///
/// A session exists from the moment the socket is accepted; it becomes
/// identified once an INIT has been processed.
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    identity: Option<String>,
}

impl Session {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            identity: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// `None` until the client has sent INIT.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub(crate) fn identify(&mut self, identity: String) {
        self.identity = Some(identity);
    }
}
