//! Sink configuration
//!
//! TOML-based settings for building a shipping sink:
//!
//! ```toml
//! url = "ws://localhost:5000/loghub"   # or the name of an [endpoints] entry
//! minimum_level = "information"
//! batch_posting_limit = 5
//! period_ms = 1000                     # defaults to 1s, 2s for in-process sinks
//! wait_before_retry_secs = 5
//!
//! [[groups]]
//! group_name = "ops"
//! output_template = "{Level:u3} {Message}"
//!
//! [endpoints]
//! loghub = "ws://relay.internal:5000/loghub"
//! ```
//!
//! A `url` without any `/` is treated as an endpoint name and looked up in
//! `[endpoints]`.

use crate::{BatchOptions, ConnectionOptions, SinkError, DEFAULT_QUEUE_CAPACITY};
use loghub_network::TransportOptions;
use loghub_types::{GroupSet, GroupTemplate, Level};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Relay url, or the name of an `[endpoints]` entry
    pub url: Option<String>,
    pub minimum_level: Level,
    pub batch_posting_limit: usize,
    /// Flush period; the mode-specific default applies when unset
    pub period_ms: Option<u64>,
    pub queue_capacity: usize,
    pub server_timeout_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub keep_alive_interval_secs: Option<u64>,
    pub wait_before_retry_secs: Option<u64>,
    pub groups: Vec<GroupTemplate>,
    /// Named relay urls
    pub endpoints: BTreeMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: None,
            minimum_level: Level::Verbose,
            batch_posting_limit: crate::DEFAULT_BATCH_POSTING_LIMIT,
            period_ms: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            server_timeout_secs: None,
            handshake_timeout_secs: None,
            keep_alive_interval_secs: None,
            wait_before_retry_secs: None,
            groups: Vec::new(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl SinkConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SinkError::invalid_config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SinkError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| SinkError::invalid_config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, SinkError> {
        toml::to_string_pretty(self)
            .map_err(|e| SinkError::invalid_config(format!("Failed to serialize to TOML: {}", e)))
    }

    /// Check value ranges; the url is checked by [`SinkConfig::resolve_url`]
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.batch_posting_limit == 0 {
            return Err(SinkError::invalid_config(
                "batch_posting_limit must be greater than 0",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SinkError::invalid_config(
                "queue_capacity must be greater than 0",
            ));
        }
        if self.period_ms == Some(0) {
            return Err(SinkError::invalid_config("period_ms must be greater than 0"));
        }
        for (name, value) in [
            ("server_timeout_secs", self.server_timeout_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
            ("keep_alive_interval_secs", self.keep_alive_interval_secs),
        ] {
            if value == Some(0) {
                return Err(SinkError::invalid_config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        // Unset values fall back to the transport defaults
        let transport = self.transport_options();
        if transport.server_timeout <= transport.keep_alive_interval {
            return Err(SinkError::invalid_config(format!(
                "server timeout ({}s) must exceed keep-alive interval ({}s)",
                transport.server_timeout.as_secs(),
                transport.keep_alive_interval.as_secs()
            )));
        }
        Ok(())
    }

    /// The relay url, with endpoint names resolved
    pub fn resolve_url(&self) -> Result<String, SinkError> {
        let url = match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => return Err(SinkError::invalid_config("A relay url is required")),
        };

        if url.contains('/') {
            return Ok(url.to_string());
        }

        match self.endpoints.get(url).map(|u| u.trim()) {
            Some(resolved) if !resolved.is_empty() => Ok(resolved.to_string()),
            _ => Err(SinkError::invalid_config(format!(
                "Invalid connection name: {}",
                url
            ))),
        }
    }

    /// Configured groups merged over the default group
    pub fn group_set(&self) -> Result<GroupSet, SinkError> {
        GroupSet::merge_with_default(self.groups.iter().cloned())
            .map_err(|e| SinkError::invalid_config(e.to_string()))
    }

    pub fn batch_options(&self, in_process: bool) -> BatchOptions {
        let defaults = if in_process {
            BatchOptions::in_process()
        } else {
            BatchOptions::default()
        };
        BatchOptions {
            batch_posting_limit: self.batch_posting_limit,
            period: self
                .period_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.period),
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        let mut options = TransportOptions::default();
        if let Some(secs) = self.server_timeout_secs {
            options = options.with_server_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.handshake_timeout_secs {
            options = options.with_handshake_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.keep_alive_interval_secs {
            options = options.with_keep_alive_interval(Duration::from_secs(secs));
        }
        options
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        let options = ConnectionOptions::default();
        match self.wait_before_retry_secs {
            Some(secs) => options.with_retry_delay(Duration::from_secs(secs)),
            None => options,
        }
    }
}
