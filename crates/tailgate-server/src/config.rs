//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default port the service listens on.
pub const DEFAULT_PORT: u16 = 3000;

/// Path of the WebSocket stream endpoint.
pub const DEFAULT_WS_PATH: &str = "/ws/logs";

/// Default interval between heartbeat sweeps.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default directory holding the JSON-lines log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Configuration for the stream server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Request path that upgrades to the log stream.
    pub ws_path: String,
    /// Credential stream clients must present as the `API_KEY` query
    /// parameter. `None` disables authentication (every attempt is let
    /// through with a warning).
    pub api_key: Option<String>,
    /// Interval between heartbeat sweeps. A connection that misses one
    /// full interval is evicted.
    pub heartbeat_interval: Duration,
    /// Directory holding the JSON-lines log files.
    pub log_dir: PathBuf,
}

impl ServerConfig {
    /// Create a configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ws_path: DEFAULT_WS_PATH.to_string(),
            api_key: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }

    /// Set the stream endpoint path.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Require this credential from stream clients.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the heartbeat sweep interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the log file directory.
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            DEFAULT_PORT,
        ))
    }
}
