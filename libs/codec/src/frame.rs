//! Invocation frame encoding and decoding
//!
//! Every frame is a single JSON text message:
//!
//! ```text
//! {"type":"invocation","target":"SendLogEvents","arguments":["ops",[{"LogLevel":2,"Message":"..."}]]}
//! ```
//!
//! A `null` group argument decodes to an empty group name; the relay
//! normalizes it to the default group.

use loghub_types::LogMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CodecError, HubMethod};

const INVOCATION: &str = "invocation";

/// Largest frame either side accepts
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    frame_type: String,
    target: String,
    #[serde(default)]
    arguments: Vec<Value>,
}

/// A decoded hub invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    SendLogEvents {
        group: String,
        messages: Vec<LogMessage>,
    },
    SendLogEventsToOthers {
        group: String,
        messages: Vec<LogMessage>,
    },
    JoinGroup {
        group: String,
    },
    LeaveGroup {
        group: String,
    },
    WriteLogEvents {
        messages: Vec<LogMessage>,
    },
}

impl HubFrame {
    pub fn method(&self) -> HubMethod {
        match self {
            HubFrame::SendLogEvents { .. } => HubMethod::SendLogEvents,
            HubFrame::SendLogEventsToOthers { .. } => HubMethod::SendLogEventsToOthers,
            HubFrame::JoinGroup { .. } => HubMethod::JoinGroup,
            HubFrame::LeaveGroup { .. } => HubMethod::LeaveGroup,
            HubFrame::WriteLogEvents { .. } => HubMethod::WriteLogEvents,
        }
    }

    /// Serialize to the JSON text frame
    ///
    /// Fails with [`CodecError::FrameTooLarge`] when the peer would refuse it.
    pub fn encode(&self) -> Result<String, CodecError> {
        let method = self.method();

        let arguments = match self {
            HubFrame::SendLogEvents { group, messages }
            | HubFrame::SendLogEventsToOthers { group, messages } => {
                vec![Value::String(group.clone()), messages_value(method, messages)?]
            }
            HubFrame::JoinGroup { group } | HubFrame::LeaveGroup { group } => {
                vec![Value::String(group.clone())]
            }
            HubFrame::WriteLogEvents { messages } => vec![messages_value(method, messages)?],
        };

        let wire = WireFrame {
            frame_type: INVOCATION.to_string(),
            target: method.as_str().to_string(),
            arguments,
        };
        let text = serde_json::to_string(&wire).map_err(|e| CodecError::Encode {
            method: method.as_str(),
            reason: e.to_string(),
        })?;
        if text.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: text.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(text)
    }

    /// Parse a JSON text frame
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        if text.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: text.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let wire: WireFrame =
            serde_json::from_str(text).map_err(|e| CodecError::malformed(e.to_string()))?;
        if wire.frame_type != INVOCATION {
            return Err(CodecError::UnsupportedFrameType {
                frame_type: wire.frame_type,
            });
        }

        let method: HubMethod = wire.target.parse()?;
        if wire.arguments.len() != method.arity() {
            return Err(CodecError::ArgumentCount {
                method: method.as_str(),
                expected: method.arity(),
                got: wire.arguments.len(),
            });
        }

        let mut args = wire.arguments.into_iter();
        let frame = match method {
            HubMethod::SendLogEvents => HubFrame::SendLogEvents {
                group: group_arg(method, args.next())?,
                messages: messages_arg(method, 1, args.next())?,
            },
            HubMethod::SendLogEventsToOthers => HubFrame::SendLogEventsToOthers {
                group: group_arg(method, args.next())?,
                messages: messages_arg(method, 1, args.next())?,
            },
            HubMethod::JoinGroup => HubFrame::JoinGroup {
                group: group_arg(method, args.next())?,
            },
            HubMethod::LeaveGroup => HubFrame::LeaveGroup {
                group: group_arg(method, args.next())?,
            },
            HubMethod::WriteLogEvents => HubFrame::WriteLogEvents {
                messages: messages_arg(method, 0, args.next())?,
            },
        };
        Ok(frame)
    }
}

fn group_arg(method: HubMethod, value: Option<Value>) -> Result<String, CodecError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(group)) => Ok(group),
        Some(other) => Err(CodecError::invalid_argument(
            method.as_str(),
            0,
            format!("expected group name string, got {}", other),
        )),
    }
}

fn messages_value(method: HubMethod, messages: &[LogMessage]) -> Result<Value, CodecError> {
    serde_json::to_value(messages).map_err(|e| CodecError::Encode {
        method: method.as_str(),
        reason: e.to_string(),
    })
}

fn messages_arg(
    method: HubMethod,
    index: usize,
    value: Option<Value>,
) -> Result<Vec<LogMessage>, CodecError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| CodecError::invalid_argument(method.as_str(), index, e)),
    }
}
