use std::fmt;
use std::str::FromStr;

use crate::CodecError;

/// Hub methods exchanged between clients and the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    /// Client to relay: deliver a batch to every member of a group
    SendLogEvents,
    /// Client to relay: deliver a batch to a group, skipping the sender
    SendLogEventsToOthers,
    /// Client to relay: add the session to a group
    JoinGroup,
    /// Client to relay: remove the session from a group
    LeaveGroup,
    /// Relay to client: pushed batch
    WriteLogEvents,
}

impl HubMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HubMethod::SendLogEvents => "SendLogEvents",
            HubMethod::SendLogEventsToOthers => "SendLogEventsToOthers",
            HubMethod::JoinGroup => "JoinGroup",
            HubMethod::LeaveGroup => "LeaveGroup",
            HubMethod::WriteLogEvents => "WriteLogEvents",
        }
    }

    /// Number of invocation arguments this method takes
    pub fn arity(self) -> usize {
        match self {
            HubMethod::SendLogEvents | HubMethod::SendLogEventsToOthers => 2,
            HubMethod::JoinGroup | HubMethod::LeaveGroup | HubMethod::WriteLogEvents => 1,
        }
    }

    /// Methods a client may invoke on the relay
    pub fn is_client_to_relay(self) -> bool {
        !matches!(self, HubMethod::WriteLogEvents)
    }
}

impl fmt::Display for HubMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubMethod {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SendLogEvents" => Ok(HubMethod::SendLogEvents),
            "SendLogEventsToOthers" => Ok(HubMethod::SendLogEventsToOthers),
            "JoinGroup" => Ok(HubMethod::JoinGroup),
            "LeaveGroup" => Ok(HubMethod::LeaveGroup),
            "WriteLogEvents" => Ok(HubMethod::WriteLogEvents),
            other => Err(CodecError::UnknownMethod {
                target: other.to_string(),
            }),
        }
    }
}
