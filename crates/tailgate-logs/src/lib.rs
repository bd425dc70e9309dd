//! # tailgate-logs
//!
//! Log domain for the tailgate observability service.
//!
//! This crate provides:
//!
//! - [`LogEntry`] — Structured log entries as stored and streamed
//! - [`LogLevel`] — Severity levels (Trace, Debug, Info, Warn, Error)
//! - [`LogHub`] — In-process publish/subscribe fan-out
//! - [`Subscription`] — Per-subscriber FIFO receiving handle
//! - [`QueryEngine`] — Filtered, paginated queries over recent files
//! - [`RotatingWriter`] — Day-stamped JSON-lines persistence
//! - [`LogPipeline`] — Producer API: persist, then broadcast
//! - [`PipelineLayer`] — `tracing` layer feeding the pipeline
//! - [`read_log_file`] / [`list_log_files`] — Forgiving file access
//!
//! ## Example
//!
//! ```rust
//! use tailgate_logs::{LogEntry, LogHub, LogLevel, LogPipeline};
//!
//! let hub = LogHub::new();
//! let subscription = hub.subscribe();
//!
//! let pipeline = LogPipeline::new(hub);
//! pipeline.emit(LogEntry::new(LogLevel::Info, "service started").with_context("Bootstrap"));
//!
//! drop(subscription);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod hub;
pub mod layer;
pub mod pipeline;
pub mod query;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export main types
pub use error::{LogError, Result};
pub use hub::{DEFAULT_SUBSCRIBER_CAP, HubStats, LogHub, Subscription};
pub use layer::PipelineLayer;
pub use pipeline::LogPipeline;
pub use query::{DEFAULT_LIMIT, LogQuery, MAX_LIMIT, QUERY_FILE_WINDOW, QueryEngine, QueryResponse};
pub use reader::{list_log_files, read_log_file};
pub use types::{LogEntry, LogFileInfo, LogLevel};
pub use writer::{RotatingWriter, WriterConfig};
