//! WebSocket server streaming hub entries to connected clients.
//!
//! [`StreamServer::bind`] starts two background tasks: an accept loop that
//! upgrades incoming sockets and a heartbeat loop that probes clients and
//! evicts the unresponsive. Each accepted client runs in its own task with
//! its own hub subscription, so one slow consumer never stalls another.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tailgate_logs::LogHub;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{debug, info, warn};

use crate::auth::authorize_upgrade;
use crate::config::ServerConfig;
use crate::connection::{
    ConnCommand, Connection, ConnectionHandle, ConnectionId, Registry, run_connection,
};
use crate::error::{ServerError, ServerResult};
use crate::message::StreamInfo;

/// Close reason sent to every client during shutdown.
const SHUTDOWN_REASON: &str = "server shutting down";

/// Accepts WebSocket clients and fans hub entries out to them.
#[derive(Debug)]
pub struct StreamServer {
    config: Arc<ServerConfig>,
    hub: LogHub,
    registry: Registry,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
}

impl StreamServer {
    /// Binds the listener and starts the accept and heartbeat loops.
    ///
    /// The hub is injected so the same instance can feed the server, the
    /// tracing layer, and anything else that publishes entries.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] when the address cannot be bound.
    pub async fn bind(config: ServerConfig, hub: LogHub) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::BindFailed(config.bind_addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindFailed(config.bind_addr, e))?;

        let config = Arc::new(config);
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&config),
            hub.clone(),
            Arc::clone(&registry),
            shutdown_rx.clone(),
        ));
        let sweep_task = tokio::spawn(heartbeat_loop(
            Arc::clone(&registry),
            config.heartbeat_interval,
            shutdown_rx,
        ));

        info!(addr = %local_addr, path = %config.ws_path, "stream server listening");

        Ok(Self {
            config,
            hub,
            registry,
            local_addr,
            shutdown_tx,
            accept_task: Some(accept_task),
            sweep_task: Some(sweep_task),
        })
    }

    /// Address the listener actually bound, useful with port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The hub feeding this server.
    #[must_use]
    pub const fn hub(&self) -> &LogHub {
        &self.hub
    }

    /// Number of clients currently tracked.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Connection details clients need to reach the stream endpoint.
    #[must_use]
    pub fn stream_info(&self) -> StreamInfo {
        StreamInfo::new(&self.config.ws_path, self.local_addr.port())
    }

    /// Stops the server, closing every client with a shutdown notice.
    ///
    /// Resolves once the listener is gone and no new connections can be
    /// accepted. Safe to call more than once.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<ConnectionHandle> = {
            let mut connections = self.registry.write().await;
            connections.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            let _ = handle
                .commands
                .send(ConnCommand::Close(SHUTDOWN_REASON.to_string()));
        }

        if let Some(task) = self.sweep_task.take() {
            let _ = task.await;
        }
        // Awaiting the accept task drops the listener with it.
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }

        info!(notified = handles.len(), "stream server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    hub: LogHub,
    registry: Registry,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let config = Arc::clone(&config);
                    let hub = hub.clone();
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, &config, hub, registry).await;
                    });
                }
                Err(error) => {
                    warn!(%error, "failed to accept connection");
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }
}

/// Upgrades one socket and drives it until it closes.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: &ServerConfig,
    hub: LogHub,
    registry: Registry,
) {
    let mut connection = Connection::new();

    let ws_path = config.ws_path.clone();
    let api_key = config.api_key.clone();
    let callback = |request: &Request, response: Response| {
        authorize_upgrade(request, &ws_path, api_key.as_deref()).map_or_else(
            |rejection| {
                debug!(%peer, ?rejection, "refused stream upgrade");
                Err(rejection.into_response())
            },
            |()| Ok(response),
        )
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(error) => {
            connection.reject();
            debug!(%peer, %error, "websocket handshake did not complete");
            return;
        }
    };

    let id = connection.id();
    info!(%id, %peer, "stream client connected");

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let alive = connection.alive_flag();
    let subscription = hub.subscribe();

    // The socket lives in its own task so the sweep can abort it when the
    // peer is dead. A task wedged in a send never drains its command
    // channel, so the abort handle is the only reliable kill switch.
    let task = tokio::spawn(run_connection(
        connection,
        ws,
        subscription,
        command_rx,
        Arc::clone(&registry),
    ));
    let handle = ConnectionHandle {
        commands: command_tx,
        alive,
        abort: task.abort_handle(),
    };
    registry.write().await.insert(id, handle);
}

async fn heartbeat_loop(
    registry: Registry,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so sweeps start one full
    // interval after bind.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => sweep(&registry).await,
            _ = shutdown_rx.changed() => break,
        }
    }
}

/// Probes responsive clients and evicts those that missed a full cycle.
async fn sweep(registry: &Registry) {
    let mut evicted: Vec<ConnectionId> = Vec::new();
    {
        let connections = registry.read().await;
        for (id, handle) in connections.iter() {
            if handle.alive.swap(false, Ordering::Relaxed) {
                // Heard from since the last sweep. Probe again and let any
                // inbound frame raise the flag before the next one.
                let _ = handle.commands.send(ConnCommand::Probe);
            } else {
                // Missed a full cycle. Aborting drops the task's
                // subscription and socket even if it is wedged in a send
                // that a close command could never interrupt.
                handle.abort.abort();
                evicted.push(*id);
            }
        }
    }

    if !evicted.is_empty() {
        let mut connections = registry.write().await;
        for id in &evicted {
            connections.remove(id);
        }
        warn!(count = evicted.len(), "evicted unresponsive stream clients");
    }
}
