//! # Loghub Relay Core
//!
//! Server side of the log hub: group membership, batch fan-out to sessions,
//! the in-process transport used when producer and relay share a process,
//! and the WebSocket front end for remote clients.

pub mod common;
pub mod config;
pub mod groups;
pub mod relay;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::*;
pub use groups::*;
pub use relay::*;
pub use server::RelayServer;
pub use common::{handle_connection, SessionOptions};
pub use transport::LocalTransport;
pub use types::*;

use loghub_codec::CodecError;

/// Relay-specific errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session limit reached: {max} concurrent sessions")]
    SessionLimit { max: usize },

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Clients may not invoke {method}")]
    UnexpectedFrame { method: &'static str },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
