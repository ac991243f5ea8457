//! `tracing` integration
//!
//! [`LogShippingLayer`] turns `tracing` events into [`LogEvent`]s and queues
//! them on a [`SinkHandle`]:
//!
//! ```no_run
//! # use message_sink::{LogShippingLayer, SinkBuilder, SinkConfig};
//! # use tracing_subscriber::layer::SubscriberExt;
//! # use tracing_subscriber::util::SubscriberInitExt;
//! # async fn run() -> Result<(), message_sink::SinkError> {
//! let sink = SinkBuilder::new(SinkConfig::with_url("ws://localhost:5000/loghub")).connect()?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(LogShippingLayer::new(sink.handle()))
//!     .init();
//! # Ok(())
//! # }
//! ```
//!
//! Events from the shipping stack itself are skipped, otherwise every batch
//! sent would log a new event to ship.

use crate::SinkHandle;
use loghub_types::{Level, LogEvent, PropertyValue};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Property holding the event target
pub const SOURCE_CONTEXT_PROPERTY: &str = "SourceContext";

const INTERNAL_TARGETS: &[&str] = &[
    "message_sink",
    "loghub_network",
    "loghub_codec",
    "relay_core",
    "tokio_tungstenite",
    "tungstenite",
];

pub struct LogShippingLayer {
    handle: SinkHandle,
    excluded_targets: Vec<String>,
}

impl LogShippingLayer {
    pub fn new(handle: SinkHandle) -> Self {
        Self {
            handle,
            excluded_targets: INTERNAL_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Skip events whose target starts with `prefix`
    pub fn with_excluded_target(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_targets.push(prefix.into());
        self
    }

    fn is_excluded(&self, target: &str) -> bool {
        self.excluded_targets.iter().any(|prefix| {
            target == prefix
                || target
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }

    pub fn handle(&self) -> &SinkHandle {
        &self.handle
    }
}

impl<S: Subscriber> Layer<S> for LogShippingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = level_from_tracing(metadata.level());
        if !self.handle.is_enabled(level) || self.is_excluded(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        // The message is already formatted; braces in it are not placeholders
        let template = visitor
            .message
            .unwrap_or_default()
            .replace('{', "{{")
            .replace('}', "}}");

        let mut log_event = LogEvent::new(level, template);
        for (name, value) in visitor.fields {
            log_event.set_property(name, value);
        }
        log_event.set_property(SOURCE_CONTEXT_PROPERTY, metadata.target());
        if let Some(error) = visitor.error {
            log_event = log_event.with_exception(error);
        }

        self.handle.emit(log_event);
    }
}

impl fmt::Debug for LogShippingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogShippingLayer")
            .field("minimum_level", &self.handle.minimum_level())
            .field("excluded_targets", &self.excluded_targets)
            .finish()
    }
}

pub fn level_from_tracing(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Verbose,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Information,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::ERROR => Level::Error,
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    error: Option<String>,
    fields: Vec<(String, PropertyValue)>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: PropertyValue) {
        self.fields.push((field.name().to_string(), value));
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.insert(field, PropertyValue::String(text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, PropertyValue::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        match serde_json::Number::from_f64(value) {
            Some(n) => self.insert(field, PropertyValue::Number(n)),
            None => self.insert(field, PropertyValue::String(value.to_string())),
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let text = value.to_string();
        if self.error.is_none() {
            self.error = Some(text.clone());
        }
        self.insert(field, PropertyValue::String(text));
    }
}
