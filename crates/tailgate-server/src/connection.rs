//! Per-client connection state and the connection task.
//!
//! Every accepted WebSocket client is tracked by a [`Connection`] that walks
//! an explicit lifecycle:
//!
//! ```text
//! Connecting ──> Open ──> Closing ──> Closed
//!      │                     ^
//!      └──> Rejected         └── heartbeat eviction or shutdown
//! ```
//!
//! The connection task owns the socket. The server reaches it only through
//! its command channel and the shared liveness flag, so a stuck client can
//! never block the accept loop or the heartbeat sweep.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, StreamExt};
use tailgate_logs::Subscription;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{RwLock, mpsc};
use tokio::task::AbortHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::message::StreamMessage;

/// Unique identifier for a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, handshake message not yet delivered.
    Connecting,
    /// Upgrade refused before the connection opened.
    Rejected,
    /// Handshake delivered, log entries flowing.
    Open,
    /// Close initiated, socket teardown in progress.
    Closing,
    /// Socket torn down and registry entry removed.
    Closed,
}

impl ConnectionState {
    /// Whether `to` is a legal next state from `self`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Connecting, Self::Open)
                | (Self::Connecting, Self::Rejected)
                | (Self::Connecting, Self::Closing)
                | (Self::Open, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Whether the connection still participates in delivery.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Rejected => "rejected",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Instructions the server sends a running connection task.
#[derive(Debug, Clone)]
pub(crate) enum ConnCommand {
    /// Ping the client to confirm it is still responsive.
    Probe,
    /// Close the connection, citing the given reason.
    Close(String),
}

/// Server-side handle to a running connection task.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionHandle {
    /// Command channel into the connection task.
    pub commands: mpsc::UnboundedSender<ConnCommand>,
    /// Set by the task on any inbound frame, cleared by the sweep.
    pub alive: Arc<AtomicBool>,
    /// Cuts the task loose when the peer is deemed dead.
    pub abort: AbortHandle,
}

/// Shared map of live connections, keyed by id.
pub(crate) type Registry = Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>;

/// Tracked state for one streaming client.
#[derive(Debug)]
pub(crate) struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    alive: Arc<AtomicBool>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    pub(crate) fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            state: ConnectionState::Connecting,
            alive: Arc::new(AtomicBool::new(true)),
            connected_at: Utc::now(),
        }
    }

    pub(crate) const fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Liveness flag shared with the heartbeat sweep.
    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub(crate) fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Moves to `to` if the lifecycle allows it.
    pub(crate) fn transition(&mut self, to: ConnectionState) -> bool {
        if self.state.can_transition_to(to) {
            trace!(id = %self.id, from = %self.state, to = %to, "connection transition");
            self.state = to;
            true
        } else {
            false
        }
    }

    /// Marks an upgrade refused before the stream opened.
    pub(crate) fn reject(&mut self) {
        self.transition(ConnectionState::Rejected);
    }
}

/// Drives one client socket until either side closes it.
///
/// Sends the handshake message, then forwards hub entries while answering
/// server commands and inbound client frames. On exit the subscription is
/// released and the registry entry removed, whatever caused the teardown.
pub(crate) async fn run_connection<S>(
    mut connection: Connection,
    ws: WebSocketStream<S>,
    mut subscription: Subscription,
    mut commands: mpsc::UnboundedReceiver<ConnCommand>,
    registry: Registry,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = connection.id();
    let (mut ws_sink, mut ws_reader) = ws.split();

    // The handshake message must reach the client before any log entry.
    let greeting = match StreamMessage::connected().to_ws() {
        Ok(msg) => msg,
        Err(error) => {
            debug!(%id, %error, "failed to encode handshake message");
            teardown(connection, subscription, &mut ws_sink, &registry).await;
            return;
        }
    };
    if let Err(error) = ws_sink.send(greeting).await {
        debug!(%id, %error, "failed to deliver handshake message");
        teardown(connection, subscription, &mut ws_sink, &registry).await;
        return;
    }
    connection.transition(ConnectionState::Open);

    loop {
        // Commands first so shutdown and eviction preempt a busy stream.
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(ConnCommand::Probe) => {
                    if ws_sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Some(ConnCommand::Close(reason)) => {
                    connection.transition(ConnectionState::Closing);
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: Cow::Owned(reason),
                    };
                    let _ = ws_sink.send(WsMessage::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },

            entry = subscription.recv() => match entry {
                Some(entry) => {
                    let msg = match StreamMessage::log(entry).to_ws() {
                        Ok(msg) => msg,
                        Err(error) => {
                            debug!(%id, %error, "failed to encode log entry, skipping");
                            continue;
                        }
                    };
                    if ws_sink.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            inbound = ws_reader.next() => match inbound {
                Some(Ok(msg)) => {
                    connection.mark_alive();
                    if let WsMessage::Close(_) = msg {
                        connection.transition(ConnectionState::Closing);
                        break;
                    }
                }
                Some(Err(error)) => {
                    debug!(%id, %error, "connection errored");
                    break;
                }
                None => break,
            },
        }
    }

    teardown(connection, subscription, &mut ws_sink, &registry).await;
}

async fn teardown<K>(
    mut connection: Connection,
    mut subscription: Subscription,
    ws_sink: &mut K,
    registry: &Registry,
) where
    K: Sink<WsMessage> + Unpin,
{
    connection.transition(ConnectionState::Closing);
    subscription.unsubscribe();
    let _ = ws_sink.close().await;
    connection.transition(ConnectionState::Closed);
    registry.write().await.remove(&connection.id());

    let uptime_ms = (Utc::now() - connection.connected_at()).num_milliseconds();
    debug!(id = %connection.id(), uptime_ms, "connection closed");
}
