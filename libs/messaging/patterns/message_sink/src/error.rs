use loghub_network::TransportError;
use std::time::Duration;

/// Failure of a single operation on a [`crate::ConnectionManager`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ConnectionError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConnectionError::Transport(e) => e.is_recoverable(),
            ConnectionError::Cancelled => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        match self {
            ConnectionError::Transport(e) => e.is_connection_error(),
            ConnectionError::Cancelled => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Dispatch to group '{group}' failed: {reason}")]
    Dispatch { group: String, reason: String },

    #[error("Sink closed")]
    Closed,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(String),
}

impl SinkError {
    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            SinkError::Connection(e) => e.is_recoverable(),
            SinkError::Dispatch { .. } | SinkError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Check if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SinkError::Connection(e) if e.is_connection_error())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SinkError::InvalidConfig(msg.into())
    }

    pub fn dispatch(group: impl Into<String>, reason: impl ToString) -> Self {
        SinkError::Dispatch {
            group: group.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<TransportError> for SinkError {
    fn from(err: TransportError) -> Self {
        SinkError::Connection(ConnectionError::Transport(err))
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}
