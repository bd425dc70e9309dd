//! Wire messages sent to stream clients.

use serde::{Deserialize, Serialize};
use tailgate_logs::LogEntry;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::ServerResult;

/// Greeting carried by the handshake acknowledgement.
pub const CONNECTED_GREETING: &str = "Connected to log stream";

/// Messages sent from the server to stream clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Handshake acknowledgement, sent once right after the upgrade.
    Connected {
        /// Human-readable greeting.
        message: String,
    },
    /// One live log entry.
    Log {
        /// The entry being streamed.
        data: LogEntry,
    },
}

impl StreamMessage {
    /// The handshake acknowledgement.
    #[must_use]
    pub fn connected() -> Self {
        Self::Connected {
            message: CONNECTED_GREETING.to_string(),
        }
    }

    /// Wraps a log entry for streaming.
    #[must_use]
    pub fn log(entry: LogEntry) -> Self {
        Self::Log { data: entry }
    }

    /// Serialize to a WebSocket text message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_ws(&self) -> ServerResult<WsMessage> {
        let json = serde_json::to_string(self)?;
        Ok(WsMessage::Text(json))
    }
}

/// Describes how to reach the stream endpoint.
///
/// Served to clients as discovery metadata alongside the query API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Request path of the WebSocket endpoint.
    pub path: String,
    /// Port the server listens on.
    pub port: u16,
    /// What connecting gets you.
    pub description: String,
    /// Example of the filters clients typically apply.
    pub filter_example: FilterExample,
}

/// Example filter payload embedded in [`StreamInfo`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterExample {
    /// Severity names.
    pub levels: Vec<String>,
    /// Producer contexts.
    pub contexts: Vec<String>,
}

impl StreamInfo {
    /// Builds the metadata for an endpoint at `path` on `port`.
    #[must_use]
    pub fn new(path: impl Into<String>, port: u16) -> Self {
        Self {
            path: path.into(),
            port,
            description: "Connect to receive real-time log updates".to_string(),
            filter_example: FilterExample {
                levels: vec!["error".to_string(), "warn".to_string()],
                contexts: vec!["Dispatch".to_string()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailgate_logs::LogLevel;

    #[test]
    fn connected_wire_shape() {
        let json = serde_json::to_value(StreamMessage::connected()).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["message"], "Connected to log stream");
    }

    #[test]
    fn log_wire_shape() {
        let entry = LogEntry::new(LogLevel::Warn, "slow handler").with_context("Api");
        let json = serde_json::to_value(StreamMessage::log(entry)).unwrap();

        assert_eq!(json["type"], "log");
        assert_eq!(json["data"]["message"], "slow handler");
        assert_eq!(json["data"]["level"], "warn");
        assert_eq!(json["data"]["context"], "Api");
    }

    #[test]
    fn messages_round_trip() {
        let entry = LogEntry::new(LogLevel::Info, "round trip");
        let msg = StreamMessage::log(entry);
        let json = serde_json::to_string(&msg).unwrap();
        let back: StreamMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn to_ws_produces_text_frame() {
        let ws = StreamMessage::connected().to_ws().unwrap();
        assert!(matches!(ws, WsMessage::Text(_)));
    }

    #[test]
    fn stream_info_uses_camel_case() {
        let info = StreamInfo::new("/ws/logs", 3000);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["path"], "/ws/logs");
        assert_eq!(json["port"], 3000);
        assert!(json["filterExample"]["levels"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("error")));
        assert_eq!(json["filterExample"]["contexts"][0], "Dispatch");
    }
}
