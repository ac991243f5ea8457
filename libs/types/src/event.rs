use crate::template::{scan, Segment};
use crate::Level;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured property value attached to an event
pub type PropertyValue = serde_json::Value;

/// Structured log event produced by an application
///
/// The message template uses the same `{Name}` placeholder syntax as output
/// templates and is resolved against [`LogEvent::properties`] at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    timestamp: DateTime<Utc>,
    level: Level,
    message_template: String,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exception: Option<String>,
}

impl LogEvent {
    pub fn new(level: Level, message_template: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message_template: message_template.into(),
            properties: BTreeMap::new(),
            exception: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message_template(&self) -> &str {
        &self.message_template
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// Resolve the message template against the event properties
    ///
    /// Placeholders without a matching property are kept verbatim. A template
    /// that does not parse is returned as-is.
    pub fn render_message(&self) -> String {
        let segments = match scan(&self.message_template) {
            Ok(segments) => segments,
            Err(_) => return self.message_template.clone(),
        };

        let mut out = String::with_capacity(self.message_template.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Hole { name, raw, .. } => match self.properties.get(&name) {
                    Some(value) => out.push_str(&render_value(value)),
                    None => out.push_str(&raw),
                },
            }
        }
        out
    }
}

/// Strings render without quotes, everything else as compact JSON
pub(crate) fn render_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => s.clone(),
        PropertyValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}
