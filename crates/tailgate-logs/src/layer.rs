//! Bridge from the process's own `tracing` events into the log pipeline.
//!
//! [`PipelineLayer`] converts each tracing event into a [`LogEntry`]: the
//! `message` field becomes the message, the event target becomes the
//! context, and every other field lands in `extra`. Entries then flow
//! through a [`LogPipeline`], so the service's own logs end up in the same
//! files and live stream it serves.

use std::collections::HashMap;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::pipeline::LogPipeline;
use crate::types::{LogEntry, LogLevel};

/// A `tracing_subscriber` layer that emits events into a [`LogPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineLayer {
    pipeline: LogPipeline,
    min_level: LogLevel,
}

impl PipelineLayer {
    /// Creates a layer delivering `Info` and above into the pipeline.
    #[must_use]
    pub fn new(pipeline: LogPipeline) -> Self {
        Self {
            pipeline,
            min_level: LogLevel::Info,
        }
    }

    /// Set the minimum severity that reaches the pipeline.
    #[must_use]
    pub fn with_min_level(mut self, min_level: LogLevel) -> Self {
        self.min_level = min_level;
        self
    }
}

impl<S: Subscriber> Layer<S> for PipelineLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = convert_level(metadata.level());
        if !level.is_at_least(self.min_level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, message).with_context(metadata.target());
        entry.extra = visitor.fields;

        self.pipeline.emit(entry);
    }
}

fn convert_level(level: &tracing::Level) -> LogLevel {
    if *level == tracing::Level::ERROR {
        LogLevel::Error
    } else if *level == tracing::Level::WARN {
        LogLevel::Warn
    } else if *level == tracing::Level::INFO {
        LogLevel::Info
    } else if *level == tracing::Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

/// Collects the `message` field and everything else separately.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: HashMap<String, serde_json::Value>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(number) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(number));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::from(rendered));
        }
    }
}
