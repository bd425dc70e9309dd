//! Core types for the log domain.
//!
//! This module provides:
//! - [`LogLevel`] — Severity levels for log entries
//! - [`LogEntry`] — Structured log entry as it appears on disk and on the wire
//! - [`LogFileInfo`] — Metadata describing one log file on disk

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::LogError;

/// Log severity levels, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed debugging information
    Trace = 0,
    /// Debugging information
    Debug = 1,
    /// General information
    Info = 2,
    /// Warning conditions
    Warn = 3,
    /// Error conditions
    Error = 4,
}

impl LogLevel {
    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    /// Parses a level name, accepting the common abbreviations seen in
    /// query strings and legacy log formats.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" | "trc" => Ok(Self::Trace),
            "debug" | "dbg" => Ok(Self::Debug),
            "info" | "inf" => Ok(Self::Info),
            "warn" | "warning" | "wrn" => Ok(Self::Warn),
            "error" | "err" | "fatal" => Ok(Self::Error),
            other => Err(LogError::UnknownLevel(other.to_string())),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured log entry.
///
/// This is the JSON-lines record format on disk and the `data` payload of
/// streamed `log` messages. Producer-specific fields beyond the known ones
/// are preserved in [`extra`](Self::extra) across a parse/serialize round
/// trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was produced (RFC 3339, offset preserved).
    pub timestamp: DateTime<FixedOffset>,
    /// Severity level.
    pub level: LogLevel,
    /// The log message.
    pub message: String,
    /// Producer component that emitted the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Any additional fields attached by the producer.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().fixed_offset(),
            level,
            message: message.into(),
            context: None,
            extra: HashMap::new(),
        }
    }

    /// Set the producer context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach an additional structured field.
    #[must_use]
    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Metadata describing one log file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileInfo {
    /// File name without directory components.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    // =========================================================================
    // LogLevel Tests
    // =========================================================================

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn level_is_at_least() {
        assert!(LogLevel::Error.is_at_least(LogLevel::Warn));
        assert!(LogLevel::Warn.is_at_least(LogLevel::Warn));
        assert!(!LogLevel::Info.is_at_least(LogLevel::Warn));
    }

    #[test]
    fn level_serde_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
    }

    #[test_case("trace", LogLevel::Trace ; "lowercase trace")]
    #[test_case("TRACE", LogLevel::Trace ; "uppercase trace")]
    #[test_case("dbg", LogLevel::Debug)]
    #[test_case("info", LogLevel::Info)]
    #[test_case("warning", LogLevel::Warn)]
    #[test_case("wrn", LogLevel::Warn)]
    #[test_case("err", LogLevel::Error)]
    #[test_case("fatal", LogLevel::Error)]
    fn level_from_str_synonyms(input: &str, expected: LogLevel) {
        assert_eq!(input.parse::<LogLevel>().unwrap(), expected);
    }

    #[test]
    fn level_from_str_unknown() {
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn level_display_round_trip() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }

    // =========================================================================
    // LogEntry Tests
    // =========================================================================

    #[test]
    fn entry_builder_chain() {
        let entry = LogEntry::new(LogLevel::Info, "dispatch received")
            .with_context("Dispatch")
            .with_field("unit", "E21");

        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "dispatch received");
        assert_eq!(entry.context.as_deref(), Some("Dispatch"));
        assert_eq!(entry.extra["unit"], serde_json::json!("E21"));
    }

    #[test]
    fn entry_serialize_skips_missing_context() {
        let entry = LogEntry::new(LogLevel::Info, "bare entry");
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("context").is_none());
    }

    #[test]
    fn entry_round_trip_preserves_extra_fields() {
        let raw = r#"{"timestamp":"2026-08-20T10:15:00.000Z","level":"warn","message":"slow call","context":"Api","durationMs":1523,"route":"/units"}"#;
        let entry: LogEntry = serde_json::from_str(raw).unwrap();

        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.context.as_deref(), Some("Api"));
        assert_eq!(entry.extra["durationMs"], serde_json::json!(1523));

        let back = serde_json::to_string(&entry).unwrap();
        let reparsed: LogEntry = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed, entry);
    }

    #[test]
    fn entry_timestamp_offset_preserved() {
        let entry =
            LogEntry::new(LogLevel::Debug, "zoned").with_timestamp(ts("2026-08-20T12:00:00+02:00"));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("+02:00"));
    }

    #[test]
    fn entry_rejects_unknown_level() {
        let raw = r#"{"timestamp":"2026-08-20T10:15:00Z","level":"loud","message":"x"}"#;
        assert!(serde_json::from_str::<LogEntry>(raw).is_err());
    }

    // =========================================================================
    // LogFileInfo Tests
    // =========================================================================

    #[test]
    fn file_info_serializes_expected_fields() {
        let info = LogFileInfo {
            name: "app-2026-08-20.log".to_string(),
            size: 2048,
            modified: Utc::now(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["name"], "app-2026-08-20.log");
        assert_eq!(value["size"], 2048);
        assert!(value["modified"].is_string());
    }
}
