//! Producer-facing composition of writer and hub.
//!
//! [`LogPipeline::emit`] is the single entry point for new log entries:
//! persist first (when a writer is attached), then fan out to live
//! subscribers. Write failures are counted rather than logged because this
//! path sits underneath the process's own log stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::hub::LogHub;
use crate::types::LogEntry;
use crate::writer::RotatingWriter;

/// Accepts log entries, persists them and publishes them to the hub.
///
/// Cloning is cheap; clones share the writer and failure counter.
#[derive(Debug, Clone)]
pub struct LogPipeline {
    hub: LogHub,
    writer: Option<Arc<RotatingWriter>>,
    write_failures: Arc<AtomicU64>,
}

impl LogPipeline {
    /// Creates a pipeline that only broadcasts, without persistence.
    #[must_use]
    pub fn new(hub: LogHub) -> Self {
        Self {
            hub,
            writer: None,
            write_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a writer so emitted entries are persisted.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<RotatingWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Persists and publishes one entry.
    ///
    /// A failed write never blocks the broadcast; it increments
    /// [`write_failures`](Self::write_failures) and the entry still reaches
    /// subscribers.
    pub fn emit(&self, entry: LogEntry) {
        if let Some(writer) = &self.writer {
            if writer.append(&entry).is_err() {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.hub.publish(&entry);
    }

    /// The hub this pipeline publishes to.
    #[must_use]
    pub fn hub(&self) -> &LogHub {
        &self.hub
    }

    /// How many writes have failed since creation.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}
