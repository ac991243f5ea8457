//! Transport Error Types
//!
//! Failures are delivered both as `Result` errors from transport calls and as
//! the payload of a close notification, so every variant is cheap to clone.

use loghub_codec::CodecError;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The endpoint could not be reached or refused the connection
    #[error("Connection error: {message} (url: {url})")]
    Connection { message: String, url: String },

    /// The endpoint URL is not usable
    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Opening handshake did not complete in time
    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// Nothing was received from the server within the server timeout
    #[error("Server timeout: no frames received for {timeout_ms}ms")]
    ServerTimeout { timeout_ms: u64 },

    /// The peer closed the session
    #[error("Connection closed by peer{}", .reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    ClosedByPeer { reason: Option<String> },

    /// Operation requires an open session
    #[error("Transport is not connected")]
    NotConnected,

    /// Frame could not be handed to the session
    #[error("Send failed: {message}")]
    Send { message: String },

    /// Underlying WebSocket protocol or I/O failure
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// Frame encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            url: url.into(),
        }
    }

    /// Create an invalid url error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    pub fn websocket(message: impl ToString) -> Self {
        Self::WebSocket {
            message: message.to_string(),
        }
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. } | Self::Codec(_))
    }

    /// Whether this error means the session is gone
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::HandshakeTimeout { .. }
                | Self::ServerTimeout { .. }
                | Self::ClosedByPeer { .. }
                | Self::NotConnected
                | Self::WebSocket { .. }
        )
    }
}
