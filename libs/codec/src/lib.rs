//! # Loghub Codec
//!
//! ## Purpose
//!
//! Wire rules shared by log clients and the relay: the hub method vocabulary
//! and the JSON invocation frames that carry it.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → network/ + relay-core
//!     ↑           ↓             ↓
//! LogMessage   HubFrame      WebSocket text frames
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Transport or socket handling (belongs in network/)
//! - Group membership or routing (belongs in relay-core)

pub mod error;
pub mod frame;
pub mod method;

pub use error::CodecError;
pub use frame::{HubFrame, MAX_FRAME_SIZE};
pub use method::HubMethod;

use loghub_types::LogMessage;

/// Build a `SendLogEvents` frame
pub fn send_log_events(group: impl Into<String>, messages: Vec<LogMessage>) -> HubFrame {
    HubFrame::SendLogEvents {
        group: group.into(),
        messages,
    }
}

/// Build a `SendLogEventsToOthers` frame
pub fn send_log_events_to_others(group: impl Into<String>, messages: Vec<LogMessage>) -> HubFrame {
    HubFrame::SendLogEventsToOthers {
        group: group.into(),
        messages,
    }
}

/// Build a `WriteLogEvents` push frame
pub fn write_log_events(messages: Vec<LogMessage>) -> HubFrame {
    HubFrame::WriteLogEvents { messages }
}
