//! End-to-end tests for the log stream endpoint.
//!
//! These tests verify:
//! 1. Handshake message and per-client delivery order
//! 2. API key enforcement at upgrade time
//! 3. Heartbeat probing, eviction, and survival of responsive clients
//! 4. Graceful shutdown notifying every client

use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tailgate_logs::{LogEntry, LogHub, LogLevel};
use tailgate_server::{CONNECTED_GREETING, ServerConfig, StreamServer};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Binds a server on an ephemeral port and returns its endpoint URL.
async fn start_server(
    configure: impl FnOnce(ServerConfig) -> ServerConfig,
) -> (StreamServer, LogHub, String) {
    let hub = LogHub::new();
    let config = configure(ServerConfig::new("127.0.0.1:0".parse().unwrap()));
    let path = config.ws_path.clone();
    let server = StreamServer::bind(config, hub.clone())
        .await
        .expect("bind test server");
    let url = format!("ws://{}{}", server.local_addr(), path);
    (server, hub, url)
}

async fn connect(url: &str) -> WsClient {
    let (ws, _) = timeout(TEST_TIMEOUT, connect_async(url))
        .await
        .expect("timed out connecting")
        .expect("connection refused");
    ws
}

/// Connects expecting the upgrade to be refused.
async fn connect_err(url: &str) -> WsError {
    match timeout(TEST_TIMEOUT, connect_async(url))
        .await
        .expect("timed out connecting")
    {
        Ok(_) => panic!("connection unexpectedly accepted"),
        Err(err) => err,
    }
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            WsMessage::Text(text) => {
                return serde_json::from_str(&text).expect("frame is not valid json");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Reads until the close frame and asserts its reason.
async fn expect_close_reason(ws: &mut WsClient, expected: &str) {
    loop {
        let msg = timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for close frame")
            .expect("stream ended without close frame")
            .expect("websocket error");
        if let WsMessage::Close(frame) = msg {
            let frame = frame.expect("close frame carried no reason");
            assert_eq!(frame.reason, expected);
            return;
        }
    }
}

async fn read_greeting(ws: &mut WsClient) {
    let greeting = next_json(ws).await;
    assert_eq!(greeting["type"], "connected");
    assert_eq!(greeting["message"], CONNECTED_GREETING);
}

fn unauthorized_status(err: &WsError) -> bool {
    matches!(err, WsError::Http(response) if response.status() == StatusCode::UNAUTHORIZED)
}

// ============================================================================
// Handshake and Delivery Tests
// ============================================================================

#[tokio::test]
async fn handshake_arrives_before_any_entry() {
    let (mut server, hub, url) = start_server(|c| c).await;
    let mut client = connect(&url).await;

    read_greeting(&mut client).await;

    hub.publish(&LogEntry::new(LogLevel::Info, "after handshake"));
    let frame = next_json(&mut client).await;
    assert_eq!(frame["type"], "log");
    assert_eq!(frame["data"]["message"], "after handshake");
    assert_eq!(frame["data"]["level"], "info");
    assert!(frame["data"]["timestamp"].is_string());

    server.close().await;
}

#[tokio::test]
async fn entries_arrive_in_publish_order() {
    let (mut server, hub, url) = start_server(|c| c).await;
    let mut client = connect(&url).await;
    read_greeting(&mut client).await;

    for i in 0..20 {
        hub.publish(&LogEntry::new(LogLevel::Info, format!("entry {i}")));
    }
    for i in 0..20 {
        let frame = next_json(&mut client).await;
        assert_eq!(frame["data"]["message"], format!("entry {i}"));
    }

    server.close().await;
}

#[tokio::test]
async fn every_client_receives_every_entry() {
    let (mut server, hub, url) = start_server(|c| c).await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;
    read_greeting(&mut first).await;
    read_greeting(&mut second).await;
    assert_eq!(server.connection_count().await, 2);

    hub.publish(&LogEntry::new(LogLevel::Warn, "fan out"));

    for client in [&mut first, &mut second] {
        let frame = next_json(client).await;
        assert_eq!(frame["type"], "log");
        assert_eq!(frame["data"]["message"], "fan out");
        assert_eq!(frame["data"]["level"], "warn");
    }

    server.close().await;
}

#[tokio::test]
async fn client_disconnect_releases_its_subscription() {
    let (mut server, hub, url) = start_server(|c| c).await;
    let mut client = connect(&url).await;
    read_greeting(&mut client).await;
    assert_eq!(hub.subscriber_count(), 1);

    client.close(None).await.expect("client close");

    let deadline = Instant::now() + TEST_TIMEOUT;
    while hub.subscriber_count() > 0 || server.connection_count().await > 0 {
        assert!(Instant::now() < deadline, "disconnect did not release the subscription");
        sleep(Duration::from_millis(10)).await;
    }

    server.close().await;
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn open_endpoint_admits_clients_without_credentials() {
    let (mut server, _hub, url) = start_server(|c| c).await;
    let mut client = connect(&url).await;
    read_greeting(&mut client).await;
    server.close().await;
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let (mut server, _hub, url) = start_server(|c| c.with_api_key("secret")).await;
    let err = connect_err(&url).await;
    assert!(unauthorized_status(&err), "expected 401, got {err:?}");
    server.close().await;
}

#[tokio::test]
async fn wrong_api_key_is_unauthorized() {
    let (mut server, _hub, url) = start_server(|c| c.with_api_key("secret")).await;
    let err = connect_err(&format!("{url}?API_KEY=guess")).await;
    assert!(unauthorized_status(&err), "expected 401, got {err:?}");
    server.close().await;
}

#[tokio::test]
async fn matching_api_key_is_admitted() {
    let (mut server, hub, url) = start_server(|c| c.with_api_key("secret")).await;
    let mut client = connect(&format!("{url}?API_KEY=secret")).await;
    read_greeting(&mut client).await;

    hub.publish(&LogEntry::new(LogLevel::Error, "authed"));
    let frame = next_json(&mut client).await;
    assert_eq!(frame["data"]["message"], "authed");

    server.close().await;
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (mut server, _hub, _url) = start_server(|c| c).await;
    let err = connect_err(&format!("ws://{}/nope", server.local_addr())).await;
    assert!(
        matches!(&err, WsError::Http(response) if response.status() == StatusCode::NOT_FOUND),
        "expected 404, got {err:?}"
    );
    server.close().await;
}

// ============================================================================
// Heartbeat Tests
// ============================================================================

#[tokio::test]
async fn silent_client_is_evicted() {
    let (mut server, _hub, url) = start_server(|c| {
        c.with_heartbeat_interval(Duration::from_millis(100))
    })
    .await;

    let mut client = connect(&url).await;
    read_greeting(&mut client).await;
    assert_eq!(server.connection_count().await, 1);

    // Stop reading entirely. No reads means no pong, so the client misses a
    // full sweep cycle and gets evicted.
    let deadline = Instant::now() + TEST_TIMEOUT;
    while server.connection_count().await > 0 {
        assert!(Instant::now() < deadline, "silent client was not evicted");
        sleep(Duration::from_millis(10)).await;
    }

    drop(client);
    server.close().await;
}

#[tokio::test]
async fn evicted_client_releases_its_subscription() {
    let (mut server, hub, url) = start_server(|c| {
        c.with_heartbeat_interval(Duration::from_millis(100))
    })
    .await;

    let mut client = connect(&url).await;
    read_greeting(&mut client).await;
    assert_eq!(hub.subscriber_count(), 1);

    // Saturate the socket so the connection task wedges mid-send, then stay
    // silent. Eviction must still release the hub subscription.
    let payload = "x".repeat(1024 * 1024);
    for _ in 0..64 {
        hub.publish(&LogEntry::new(LogLevel::Info, payload.clone()));
    }

    let deadline = Instant::now() + TEST_TIMEOUT;
    while server.connection_count().await > 0 || hub.subscriber_count() > 0 {
        assert!(
            Instant::now() < deadline,
            "eviction left the subscription behind"
        );
        sleep(Duration::from_millis(10)).await;
    }

    // Nothing is queued for the evicted client anymore.
    assert_eq!(hub.publish(&LogEntry::new(LogLevel::Info, "after eviction")), 0);

    drop(client);
    server.close().await;
}

#[tokio::test]
async fn responsive_client_survives_many_sweeps() {
    let (mut server, _hub, url) = start_server(|c| {
        c.with_heartbeat_interval(Duration::from_millis(100))
    })
    .await;

    let mut client = connect(&url).await;
    read_greeting(&mut client).await;

    // Keep polling so pings are answered automatically.
    let poller = tokio::spawn(async move {
        while let Some(Ok(msg)) = client.next().await {
            if matches!(msg, WsMessage::Close(_)) {
                break;
            }
        }
    });

    sleep(Duration::from_millis(600)).await;
    assert_eq!(server.connection_count().await, 1);

    server.close().await;
    let _ = timeout(TEST_TIMEOUT, poller).await;
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn shutdown_notifies_every_client() {
    let (mut server, hub, url) = start_server(|c| c).await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;
    read_greeting(&mut first).await;
    read_greeting(&mut second).await;

    server.close().await;

    expect_close_reason(&mut first, "server shutting down").await;
    expect_close_reason(&mut second, "server shutting down").await;
    assert_eq!(server.connection_count().await, 0);

    let deadline = Instant::now() + TEST_TIMEOUT;
    while hub.subscriber_count() > 0 {
        assert!(Instant::now() < deadline, "subscriptions were not released");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn no_new_connections_after_shutdown() {
    let (mut server, _hub, url) = start_server(|c| c).await;
    server.close().await;

    let result = timeout(TEST_TIMEOUT, connect_async(&url)).await;
    assert!(matches!(result, Ok(Err(_))), "listener should be gone");
}
