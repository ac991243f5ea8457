//! Wire-level errors for invocation frame processing
//!
//! Every variant carries enough context to identify the offending frame in
//! relay logs without dumping the whole payload.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Frame text is not valid JSON or does not have the invocation shape
    #[error("Malformed frame: {reason}")]
    Malformed { reason: String },

    /// The `type` field names a frame kind this codec does not speak
    #[error("Unsupported frame type '{frame_type}': only 'invocation' frames are accepted")]
    UnsupportedFrameType { frame_type: String },

    /// The `target` field is not one of the hub methods
    #[error("Unknown hub method '{target}'")]
    UnknownMethod { target: String },

    /// Wrong number of invocation arguments
    #[error("{method} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        method: &'static str,
        expected: usize,
        got: usize,
    },

    /// An argument failed to deserialize
    #[error("{method} argument {index} is invalid: {reason}")]
    InvalidArgument {
        method: &'static str,
        index: usize,
        reason: String,
    },

    /// Frame exceeds the configured size limit
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Serialization of an outgoing frame failed
    #[error("Failed to encode {method}: {reason}")]
    Encode { method: &'static str, reason: String },
}

impl CodecError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(method: &'static str, index: usize, reason: impl ToString) -> Self {
        Self::InvalidArgument {
            method,
            index,
            reason: reason.to_string(),
        }
    }

    /// Whether the peer sent something this side does not understand
    ///
    /// Protocol violations are logged and the frame dropped; the session stays
    /// open. Encode failures indicate a local bug.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::Encode { .. })
    }
}
