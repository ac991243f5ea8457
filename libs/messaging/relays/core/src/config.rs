//! # Relay Configuration
//!
//! Two sections, both optional in the file:
//!
//! ```toml
//! [relay]
//! name = "loghub"
//! max_sessions = 10000         # Concurrent client sessions
//! outbound_buffer = 1024       # Batches queued per session before drops
//!
//! [transport]
//! bind_address = "127.0.0.1:5000"
//! path = "/loghub"             # Informational; any path is accepted
//! handshake_timeout_secs = 15
//! keep_alive_interval_secs = 15
//! client_timeout_secs = 30     # Close sessions silent for this long
//! ```
//!
//! The client timeout should be at least twice the clients' keep-alive
//! interval.

use crate::{RelayError, DEFAULT_MAX_SESSIONS, DEFAULT_OUTBOUND_BUFFER};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main relay configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub relay: RelaySettings,
    pub transport: TransportSettings,
}

/// Core relay settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Human-readable name used in logs
    pub name: String,
    pub max_sessions: usize,
    pub outbound_buffer: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            name: "loghub".to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

/// WebSocket front end settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportSettings {
    pub bind_address: String,
    pub path: String,
    pub handshake_timeout_secs: u64,
    pub keep_alive_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            path: "/loghub".to_string(),
            handshake_timeout_secs: 15,
            keep_alive_interval_secs: 15,
            client_timeout_secs: 30,
        }
    }
}

impl TransportSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl RelayConfig {
    /// Load configuration from TOML file
    #[cfg(feature = "config-files")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&contents)
    }

    #[cfg(feature = "config-files")]
    pub fn from_toml_str(contents: &str) -> Result<Self, RelayError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, RelayError> {
        self.transport.bind_address.parse().map_err(|e| {
            RelayError::Config(format!(
                "Invalid bind_address '{}': {}",
                self.transport.bind_address, e
            ))
        })
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        self.bind_addr()?;

        if self.relay.max_sessions == 0 {
            return Err(RelayError::Config("max_sessions must be > 0".to_string()));
        }
        if self.relay.outbound_buffer == 0 {
            return Err(RelayError::Config("outbound_buffer must be > 0".to_string()));
        }
        let t = &self.transport;
        if t.handshake_timeout_secs == 0 || t.keep_alive_interval_secs == 0 {
            return Err(RelayError::Config(
                "handshake_timeout_secs and keep_alive_interval_secs must be > 0".to_string(),
            ));
        }
        if t.client_timeout_secs <= t.keep_alive_interval_secs {
            return Err(RelayError::Config(format!(
                "client_timeout_secs ({}) must exceed keep_alive_interval_secs ({})",
                t.client_timeout_secs, t.keep_alive_interval_secs
            )));
        }
        Ok(())
    }
}
