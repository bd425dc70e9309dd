//! Querying recent log history from disk.
//!
//! A query scans the most recent application log files, merges their
//! entries newest first, applies filters in a fixed order and paginates
//! the result. Filter parameters arrive as loosely typed strings (query
//! params); anything malformed falls back to its default rather than
//! failing the request.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LogError, Result};
use crate::reader;
use crate::types::{LogEntry, LogFileInfo, LogLevel};

/// Default page size when `limit` is absent or unusable.
pub const DEFAULT_LIMIT: usize = 100;

/// Hard ceiling on the page size.
pub const MAX_LIMIT: usize = 1000;

/// How many of the newest application log files a query will scan.
pub const QUERY_FILE_WINDOW: usize = 7;

/// Filename prefix of the application log family.
const APP_FILE_PREFIX: &str = "app-";

/// Filter and pagination parameters for one query.
///
/// Every field is optional; the zero value matches everything and returns
/// the first [`DEFAULT_LIMIT`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Keep only these levels (empty keeps all).
    pub levels: Vec<LogLevel>,
    /// Keep only these producer contexts, matched exactly (empty keeps all).
    pub contexts: Vec<String>,
    /// Keep entries at or after this instant.
    pub since: Option<DateTime<FixedOffset>>,
    /// Keep entries at or before this instant.
    pub until: Option<DateTime<FixedOffset>>,
    /// Case-insensitive text search over the message and the serialized
    /// entry.
    pub search: Option<String>,
    /// Requested page size.
    pub limit: Option<usize>,
    /// Entries to skip before the page starts.
    pub offset: Option<usize>,
}

impl LogQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a level to keep.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Add a producer context to keep.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.push(context.into());
        self
    }

    /// Set the inclusive lower time bound.
    #[must_use]
    pub fn with_since(mut self, since: DateTime<FixedOffset>) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the inclusive upper time bound.
    #[must_use]
    pub fn with_until(mut self, until: DateTime<FixedOffset>) -> Self {
        self.until = Some(until);
        self
    }

    /// Set the search text.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the page offset.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Builds a query from loosely typed key/value parameters.
    ///
    /// Recognized keys: `level`, `context` (both accept comma-separated
    /// values and repeated keys), `since`, `until` (RFC 3339), `search`,
    /// `limit`, `offset`. Unknown keys are ignored; malformed values fall
    /// back to the default for their field. This never fails.
    pub fn from_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut query = Self::new();
        for (key, value) in params {
            match key {
                "level" => {
                    for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                        match token.parse::<LogLevel>() {
                            Ok(level) if !query.levels.contains(&level) => query.levels.push(level),
                            Ok(_) => {}
                            Err(_) => debug!(token, "ignoring unknown level in query"),
                        }
                    }
                }
                "context" => {
                    for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                        if !query.contexts.iter().any(|c| c == token) {
                            query.contexts.push(token.to_string());
                        }
                    }
                }
                "since" => query.since = parse_timestamp(value),
                "until" => query.until = parse_timestamp(value),
                "search" => {
                    if !value.is_empty() {
                        query.search = Some(value.to_string());
                    }
                }
                "limit" => query.limit = value.parse().ok(),
                "offset" => query.offset = value.parse().ok(),
                _ => {}
            }
        }
        query
    }

    /// Page size after defaulting and clamping.
    ///
    /// Absent and zero both mean "default"; anything above [`MAX_LIMIT`] is
    /// clamped down to it.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(limit) => limit.min(MAX_LIMIT),
        }
    }

    /// Page offset after defaulting.
    #[must_use]
    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Whether an entry survives every filter.
    ///
    /// Filters apply in a fixed order: level, context, since, until,
    /// search. Both time bounds are inclusive. The search is
    /// case-insensitive and matches the message or, failing that, the
    /// entry's full serialized JSON, so structured field values are
    /// searchable too.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }

        if !self.contexts.is_empty() {
            let Some(context) = entry.context.as_deref() else {
                return false;
            };
            if !self.contexts.iter().any(|c| c == context) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !entry.message.to_lowercase().contains(&needle) {
                let serialized = serde_json::to_string(entry)
                    .map(|s| s.to_lowercase())
                    .unwrap_or_default();
                if !serialized.contains(&needle) {
                    return false;
                }
            }
        }

        true
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Some(ts),
        Err(_) => {
            debug!(value, "ignoring malformed timestamp in query");
            None
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The page of entries, newest first.
    pub logs: Vec<LogEntry>,
    /// Matching entries before pagination.
    pub total: usize,
    /// Effective page size used.
    pub limit: usize,
    /// Effective offset used.
    pub offset: usize,
}

/// Serves queries over the on-disk log history.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    log_dir: PathBuf,
    max_files: usize,
}

impl QueryEngine {
    /// Creates an engine reading from the given log directory.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            max_files: QUERY_FILE_WINDOW,
        }
    }

    /// Override how many recent files a query scans.
    #[must_use]
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// The directory this engine reads from.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Runs a query against the recent application log files.
    ///
    /// Entries from the [`QUERY_FILE_WINDOW`] newest `app-` files are
    /// merged, sorted newest first (stable, so entries with equal
    /// timestamps keep file order), filtered, counted and paginated.
    ///
    /// If any candidate file cannot be read the whole query fails with
    /// [`LogError::ReadFailed`]; partial results are never served with a
    /// wrong `total`.
    pub async fn query(&self, query: &LogQuery) -> Result<QueryResponse> {
        let mut entries = Vec::new();
        for path in self.candidate_files().await {
            let mut file_entries = reader::read_log_file(&path).await.map_err(|err| {
                warn!(path = %path.display(), error = %err, "query aborted: unreadable log file");
                LogError::ReadFailed
            })?;
            entries.append(&mut file_entries);
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let filtered: Vec<LogEntry> = entries.into_iter().filter(|e| query.matches(e)).collect();
        let total = filtered.len();
        let limit = query.effective_limit();
        let offset = query.effective_offset();
        let logs = apply_page(filtered, offset, limit);

        Ok(QueryResponse {
            logs,
            total,
            limit,
            offset,
        })
    }

    /// Lists every log file in the directory, newest first.
    pub async fn list_files(&self) -> Vec<LogFileInfo> {
        reader::list_log_files(&self.log_dir).await
    }

    /// The newest application log files, capped at the query window.
    async fn candidate_files(&self) -> Vec<PathBuf> {
        reader::list_log_files(&self.log_dir)
            .await
            .into_iter()
            .filter(|f| f.name.starts_with(APP_FILE_PREFIX))
            .take(self.max_files)
            .map(|f| self.log_dir.join(&f.name))
            .collect()
    }
}

fn apply_page<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
