use crate::Level;
use serde::{Deserialize, Serialize};

/// A log event rendered for one group
///
/// Serialized as `{"LogLevel": <int>, "Message": <string>}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogMessage {
    #[serde(rename = "LogLevel")]
    level: i32,

    #[serde(rename = "Message")]
    message: String,
}

impl LogMessage {
    pub fn new(level: i32, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn with_level(level: Level, message: impl Into<String>) -> Self {
        Self::new(level.ordinal(), message)
    }

    /// Raw integer level as carried on the wire
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Level as a known severity, if the ordinal is in range
    pub fn severity(&self) -> Option<Level> {
        Level::try_from(self.level).ok()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_parts(self) -> (i32, String) {
        (self.level, self.message)
    }
}
