use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::relay::RelayEngine;

/// Per-connection tuning applied by the WebSocket actor.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Interval between server-initiated WebSocket pings (zero disables)
    pub ping_interval: Duration,
    /// How long to wait for a pong before closing
    pub pong_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer,
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Relay engine owning the connection registry
    pub relay: Arc<RelayEngine>,
    pub settings: ConnectionSettings,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            relay: Arc::new(RelayEngine::new(Duration::from_millis(
                config.send_timeout_ms,
            ))),
            settings: ConnectionSettings::from_config(config),
        }
    }
}
