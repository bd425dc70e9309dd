//! # tailgate-server
//!
//! WebSocket server that streams log entries to connected clients in real
//! time.
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!   ws clients ◀────▶│ StreamServer                 │
//!                    │   accept loop ─▶ Connection  │◀── LogHub
//!                    │   heartbeat sweep            │
//!                    └──────────────────────────────┘
//! ```
//!
//! - [`StreamServer`] binds the listener and owns the accept and heartbeat
//!   loops
//! - [`ServerConfig`] carries the bind address, endpoint path, optional API
//!   key, and heartbeat interval
//! - [`StreamMessage`] is the wire envelope: a `connected` handshake, then
//!   one `log` frame per entry
//! - [`ConnectionState`] tracks each client through its lifecycle
//! - [`authorize_upgrade`] enforces the `API_KEY` query parameter when a
//!   credential is configured
//!
//! The hub is injected at bind time, so the process that publishes entries
//! decides what the server streams.
//!
//! # Example
//!
//! ```no_run
//! use tailgate_logs::{LogEntry, LogHub, LogLevel};
//! use tailgate_server::{ServerConfig, StreamServer};
//!
//! # async fn run() -> tailgate_server::ServerResult<()> {
//! let hub = LogHub::new();
//! let config = ServerConfig::default().with_api_key("secret");
//! let mut server = StreamServer::bind(config, hub.clone()).await?;
//!
//! hub.publish(&LogEntry::new(LogLevel::Info, "service started"));
//!
//! server.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod server;

pub use auth::{API_KEY_PARAM, UpgradeRejection, authorize_upgrade};
pub use config::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LOG_DIR, DEFAULT_PORT, DEFAULT_WS_PATH, ServerConfig,
};
pub use connection::{ConnectionId, ConnectionState};
pub use error::{ServerError, ServerResult};
pub use message::{CONNECTED_GREETING, FilterExample, StreamInfo, StreamMessage};
pub use server::StreamServer;
