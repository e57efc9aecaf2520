use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Real-time WebSocket message relay
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "relay-server", version, about = "Real-time WebSocket message relay")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "RELAY_PORT", default_value = "8080")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "RELAY_BIND_ADDRESS", default_value = "127.0.0.1")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Upper bound on a single outbound send, in milliseconds
    #[arg(long, env = "RELAY_SEND_TIMEOUT_MS", default_value = "5000")]
    pub send_timeout_ms: u64,

    /// Capacity of each connection's outbound queue
    #[arg(long, env = "RELAY_OUTBOUND_BUFFER", default_value = "64")]
    pub outbound_buffer: usize,

    /// Seconds between periodic liveness sweeps (0 disables the timer)
    #[arg(long, env = "RELAY_SWEEP_INTERVAL_SECS", default_value = "30")]
    pub sweep_interval_secs: u64,

    /// Seconds between server-initiated WebSocket pings (0 disables)
    #[arg(long, env = "RELAY_PING_INTERVAL_SECS", default_value = "30")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing the connection
    #[arg(long, env = "RELAY_PONG_TIMEOUT_SECS", default_value = "10")]
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "127.0.0.1".to_string(),
            config: "./relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            send_timeout_ms: 5000,
            outbound_buffer: 64,
            sweep_interval_secs: 30,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 127.0.0.1)
# bind_address = "127.0.0.1"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Delivery ----

# Upper bound on one outbound send in milliseconds (default: 5000).
# A client whose queue stays full this long is treated as disconnected.
# send_timeout_ms = 5000

# Outbound queue capacity per connection (default: 64)
# outbound_buffer = 64

# ---- Liveness ----

# Seconds between periodic liveness sweeps (default: 30, 0 = only on client ping)
# sweep_interval_secs = 30

# Server-initiated WebSocket ping interval in seconds (default: 30, 0 = off)
# ping_interval_secs = 30

# Seconds to wait for a pong before closing (default: 10)
# pong_timeout_secs = 10
"#
    .to_string()
}
